//! Rewindable rolling-window state for transforms
//!
//! Transforms that keep running state between calls must be able to rebuild
//! it from the provider cache when a rebuild rewinds them. `RollingExtreme`
//! is keyed by provider index so it can be re-primed from any position.

use std::collections::VecDeque;

/// Which extreme a window tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extreme {
    Highest,
    Lowest,
}

/// Rolling max or min over the last `window` pushed indices, kept as a
/// monotonic deque (amortized O(1) per push).
#[derive(Debug, Clone)]
pub struct RollingExtreme<V> {
    extreme: Extreme,
    window: usize,
    entries: VecDeque<(usize, V)>,
    last_index: Option<usize>,
}

impl<V: PartialOrd + Copy> RollingExtreme<V> {
    pub fn new(extreme: Extreme, window: usize) -> Self {
        Self {
            extreme,
            window,
            entries: VecDeque::with_capacity(window),
            last_index: None,
        }
    }

    pub fn highest(window: usize) -> Self {
        Self::new(Extreme::Highest, window)
    }

    pub fn lowest(window: usize) -> Self {
        Self::new(Extreme::Lowest, window)
    }

    /// Push the value at provider position `index`. Indices must increase.
    pub fn push(&mut self, index: usize, value: V) {
        debug_assert!(self.last_index.map_or(true, |last| index > last));

        while self
            .entries
            .front()
            .is_some_and(|&(i, _)| i + self.window <= index)
        {
            self.entries.pop_front();
        }

        let extreme = self.extreme;
        while self.entries.back().is_some_and(|&(_, held)| match extreme {
            Extreme::Highest => held <= value,
            Extreme::Lowest => held >= value,
        }) {
            self.entries.pop_back();
        }

        self.entries.push_back((index, value));
        self.last_index = Some(index);
    }

    /// Extreme over the window ending at the last pushed index.
    pub fn current(&self) -> Option<V> {
        self.entries.front().map(|&(_, value)| value)
    }

    /// Index of the last push, if any.
    pub fn last_index(&self) -> Option<usize> {
        self.last_index
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_index = None;
    }
}
