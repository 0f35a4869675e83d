//! Analyze/Modify state machine
//!
//! `analyze` decides what an incoming item means for the cache; `modify`
//! applies one surgical transition. Hubs with an upstream provider only ever
//! append on `Add` and answer everything else with a rebuild of the affected
//! suffix. Root sources, which have nothing to replay from, resolve a
//! rebuild into the in-place `AddOld`/`Update` transition instead.

use tracing::debug;

use types::errors::StreamError;
use types::series::Series;
use types::timestamp::Timestamp;

use crate::act::Act;
use crate::cache::TimeSeriesCache;
use crate::config::HubConfig;
use crate::overflow::{Arrival, OverflowGuard};

/// Owns one hub's cache, its overflow guard and its fault flag.
#[derive(Debug, Clone)]
pub struct CacheMutator<T> {
    cache: TimeSeriesCache<T>,
    guard: OverflowGuard<T>,
    max_cache_size: Option<usize>,
    faulted: bool,
}

impl<T: Series> CacheMutator<T> {
    pub fn new(config: &HubConfig) -> Self {
        Self {
            cache: TimeSeriesCache::new(),
            guard: OverflowGuard::new(config.overflow_threshold),
            max_cache_size: config.max_cache_size,
            faulted: false,
        }
    }

    pub fn cache(&self) -> &TimeSeriesCache<T> {
        &self.cache
    }

    pub fn guard(&self) -> &OverflowGuard<T> {
        &self.guard
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    /// Clear the fault flag and the repeat counter. The cache is untouched.
    pub fn reset_fault(&mut self) {
        self.faulted = false;
        self.guard.clear_count();
    }

    /// Classify an arrival: `Ignore`, `Add` or `Rebuild`.
    ///
    /// An overflow sets the fault flag before the error is returned.
    pub fn analyze(&mut self, item: &T) -> Result<Act, StreamError> {
        match self.guard.classify(item) {
            Err(err) => {
                self.faulted = true;
                return Err(err);
            }
            Ok(Arrival::Ignore) => return Ok(Act::Ignore),
            Ok(Arrival::Proceed) => {}
        }

        Ok(match self.cache.last() {
            Some(last) if item.timestamp() <= last.timestamp() => Act::Rebuild,
            _ => Act::Add,
        })
    }

    /// Classify an item that may revise the last entry in place.
    ///
    /// A same-timestamp-as-last item yields `Update` (or `Ignore` when
    /// identical) without touching the repeat counter; producers that build
    /// a bar tick by tick revise their newest entry many times legitimately.
    pub fn analyze_revision(&mut self, item: &T) -> Result<Act, StreamError> {
        if let Some(last) = self.cache.last() {
            if last.timestamp() == item.timestamp() {
                return Ok(if last == item { Act::Ignore } else { Act::Update });
            }
        }
        self.analyze(item)
    }

    /// Surgical transition for an item that cannot simply be appended.
    pub fn resolve(&self, item: &T) -> Act {
        let ts = item.timestamp();
        match self.cache.last() {
            None => Act::Add,
            Some(last) if ts > last.timestamp() => Act::Add,
            _ if self.cache.find_index(ts).is_some() => Act::Update,
            _ => Act::AddOld,
        }
    }

    /// Apply one transition. Returns the act actually performed (an identical
    /// `Update` is demoted to `Ignore`) and the affected index.
    pub fn modify(&mut self, act: Act, item: T) -> Result<(Act, Option<usize>), StreamError> {
        let ts = item.timestamp();

        match act {
            Act::Add => {
                if let Some(last) = self.cache.last() {
                    if last.timestamp() >= ts {
                        return Err(StreamError::invariant(format!(
                            "append at {} is not after last entry at {}",
                            ts,
                            last.timestamp()
                        )));
                    }
                }
                let index = self.cache.append(item);
                self.faulted = false;
                Ok((Act::Add, Some(index)))
            }
            Act::AddOld => {
                if self.cache.find_index(ts).is_some() {
                    return Err(StreamError::invariant(format!(
                        "insert at {} would duplicate an existing timestamp",
                        ts
                    )));
                }
                let index = self.cache.insert_sorted(item);
                Ok((Act::AddOld, Some(index)))
            }
            Act::Update => {
                let index = self
                    .cache
                    .find_index(ts)
                    .ok_or(StreamError::NotFound { timestamp: ts })?;
                if self.cache[index] == item {
                    debug!(timestamp = %ts, "Update identical to cached entry");
                    return Ok((Act::Ignore, Some(index)));
                }
                self.cache.replace(index, item)?;
                Ok((Act::Update, Some(index)))
            }
            Act::Delete => {
                let index = self
                    .cache
                    .index_of(&item)
                    .or_else(|| self.cache.find_index(ts))
                    .ok_or(StreamError::NotFound { timestamp: ts })?;
                self.cache.remove_at(index)?;
                self.guard.forget_from(ts);
                Ok((Act::Delete, Some(index)))
            }
            Act::Ignore => Ok((Act::Ignore, None)),
            Act::Rebuild => Err(StreamError::invariant(
                "rebuild is not a single-item cache modification",
            )),
        }
    }

    /// Delete the entry at `index`.
    pub fn remove_at(&mut self, index: usize) -> Result<T, StreamError> {
        let item = self.cache.remove_at(index)?;
        self.guard.forget_from(item.timestamp());
        Ok(item)
    }

    /// Delete the last entry if it is at or after `from`.
    ///
    /// Calling this until it returns `None` walks a range deletion from the
    /// end toward `from`.
    pub fn delete_last_from(&mut self, from: Timestamp) -> Result<Option<T>, StreamError> {
        let last = match self.cache.last() {
            Some(last) if last.timestamp() >= from => last.clone(),
            _ => return Ok(None),
        };
        self.modify(Act::Delete, last.clone())?;
        Ok(Some(last))
    }

    /// Silently drop every entry at or after `from`.
    pub fn truncate_from(&mut self, from: Timestamp) -> usize {
        let removed = self.cache.truncate_from_timestamp(from);
        if removed > 0 {
            self.guard.forget_from(from);
        }
        removed
    }

    /// Drop the oldest entries until the cache fits the configured maximum.
    ///
    /// Returns the timestamp of the newest entry dropped, or `None` when the
    /// cache already fits.
    pub fn prune(&mut self) -> Option<Timestamp> {
        let max = self.max_cache_size?;
        let excess = self.cache.len().saturating_sub(max);
        if excess == 0 {
            return None;
        }
        let to = self.cache.prune_front(excess)?;
        debug!(pruned = excess, to = %to, "Cache pruned to maximum size");
        Some(to)
    }

    /// Drop every entry at or before `to`, following a provider prune.
    pub fn prune_through(&mut self, to: Timestamp) -> usize {
        self.cache.remove_through(to)
    }

    /// Place a replayed item: append, replace same timestamp, or insert sorted.
    ///
    /// Replay bypasses the overflow guard; the provider cache it is read
    /// from is already settled.
    pub fn settle(&mut self, item: T) -> Result<usize, StreamError> {
        let ts = item.timestamp();
        let newer = self.cache.last().map_or(true, |last| ts > last.timestamp());
        if newer {
            return Ok(self.cache.append(item));
        }
        match self.cache.find_index(ts) {
            Some(index) => {
                self.cache.replace(index, item)?;
                Ok(index)
            }
            None => Ok(self.cache.insert_sorted(item)),
        }
    }
}
