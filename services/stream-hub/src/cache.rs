//! Time-ordered, timestamp-unique cache
//!
//! Each hub owns exactly one `TimeSeriesCache`. Entries are kept sorted by
//! timestamp and, once a mutation has settled, no two entries share one.
//! Lookups are binary searches on the timestamp; the hot append path checks
//! the last entry first so a repeat of the newest timestamp costs O(1).

use std::ops::Index;

use types::errors::StreamError;
use types::series::Series;
use types::timestamp::Timestamp;

/// Ordered sequence of cached items.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesCache<T> {
    items: Vec<T>,
}

impl<T> Default for TimeSeriesCache<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Series> TimeSeriesCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Append at the end and return the new index.
    ///
    /// The caller guarantees the item is newer than the current last entry.
    pub fn append(&mut self, item: T) -> usize {
        debug_assert!(
            self.last().map_or(true, |last| last.timestamp() < item.timestamp()),
            "append would break timestamp ordering"
        );
        self.items.push(item);
        self.items.len() - 1
    }

    /// Insert before the first entry whose timestamp exceeds the item's.
    /// Appends when no such entry exists.
    pub fn insert_sorted(&mut self, item: T) -> usize {
        let ts = item.timestamp();
        let index = self.items.partition_point(|x| x.timestamp() <= ts);
        self.items.insert(index, item);
        index
    }

    /// Replace the entry at `index`, returning the previous one.
    pub fn replace(&mut self, index: usize, item: T) -> Result<T, StreamError> {
        let len = self.items.len();
        let slot = self
            .items
            .get_mut(index)
            .ok_or(StreamError::IndexOutOfRange { index, len })?;
        Ok(std::mem::replace(slot, item))
    }

    pub fn remove_at(&mut self, index: usize) -> Result<T, StreamError> {
        if index >= self.items.len() {
            return Err(StreamError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        Ok(self.items.remove(index))
    }

    /// Index of the entry at exactly `ts`.
    pub fn find_index(&self, ts: Timestamp) -> Option<usize> {
        let last = self.items.last()?;
        if last.timestamp() == ts {
            return Some(self.items.len() - 1);
        }
        if last.timestamp() < ts {
            return None;
        }
        self.items
            .binary_search_by(|entry| entry.timestamp().cmp(&ts))
            .ok()
    }

    /// Index of an entry equal to `item` in both timestamp and payload.
    ///
    /// While a multi-step mutation is in flight a timestamp may be present
    /// more than once, so the search starts at the later end of the run of
    /// equal timestamps and walks back toward its start.
    pub fn index_of(&self, item: &T) -> Option<usize> {
        let ts = item.timestamp();
        let upper = self.items.partition_point(|x| x.timestamp() <= ts);
        self.items[..upper]
            .iter()
            .rev()
            .take_while(|x| x.timestamp() == ts)
            .position(|x| x == item)
            .map(|offset| upper - 1 - offset)
    }

    /// Lower bound: first index whose timestamp is `>= ts`.
    pub fn first_index_at_or_after(&self, ts: Timestamp) -> Option<usize> {
        let index = self.items.partition_point(|x| x.timestamp() < ts);
        (index < self.items.len()).then_some(index)
    }

    /// Remove `[index, len)` and return how many entries were dropped.
    pub fn truncate_from(&mut self, index: usize) -> usize {
        let removed = self.items.len().saturating_sub(index);
        self.items.truncate(index);
        removed
    }

    /// Remove every entry at or after `ts`.
    pub fn truncate_from_timestamp(&mut self, ts: Timestamp) -> usize {
        match self.first_index_at_or_after(ts) {
            Some(index) => self.truncate_from(index),
            None => 0,
        }
    }

    /// Drop the oldest `count` entries. Returns the timestamp of the newest
    /// one dropped.
    pub fn prune_front(&mut self, count: usize) -> Option<Timestamp> {
        let count = count.min(self.items.len());
        let to = self.items[..count].last()?.timestamp();
        self.items.drain(..count);
        Some(to)
    }

    /// Remove every entry at or before `ts`.
    pub fn remove_through(&mut self, ts: Timestamp) -> usize {
        let count = self.items.partition_point(|x| x.timestamp() <= ts);
        self.items.drain(..count);
        count
    }

    /// Check the settled-cache invariant: strictly increasing timestamps.
    pub fn is_strictly_ordered(&self) -> bool {
        self.items
            .windows(2)
            .all(|pair| pair[0].timestamp() < pair[1].timestamp())
    }
}

impl<T> Index<usize> for TimeSeriesCache<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.items[index]
    }
}

impl<'a, T> IntoIterator for &'a TimeSeriesCache<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
