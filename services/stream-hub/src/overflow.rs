//! Repeated-arrival circuit breaker
//!
//! A hub that (directly or through a chain) ends up observing its own output
//! would re-ingest the same timestamp forever. The guard counts consecutive
//! arrivals that share a timestamp and turns the condition into a fatal
//! `StreamError::Overflow` once the count exceeds the threshold.
//!
//! The timestamp comparison runs before the payload comparison: it is cheap
//! and must count every repeat, including payload-identical ones that are
//! then ignored.

use tracing::{debug, error};

use types::errors::StreamError;
use types::series::Series;
use types::timestamp::Timestamp;

/// Default number of tolerated same-timestamp repeats.
pub const DEFAULT_OVERFLOW_THRESHOLD: u32 = 100;

/// Verdict for one arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// New information; continue classification.
    Proceed,
    /// Payload-equal re-delivery of the last arrival.
    Ignore,
}

/// Per-hub repeat counter: (last arrival fingerprint, repeat count).
///
/// The timestamp of the last arrival and its payload are tracked apart:
/// forgetting the payload after a deletion re-admits an identical item but
/// must not reset the repeat count of a producer stuck on one timestamp.
#[derive(Debug, Clone)]
pub struct OverflowGuard<T> {
    last_timestamp: Option<Timestamp>,
    last: Option<T>,
    repeats: u32,
    threshold: u32,
}

impl<T: Series> OverflowGuard<T> {
    pub fn new(threshold: u32) -> Self {
        Self {
            last_timestamp: None,
            last: None,
            repeats: 0,
            threshold,
        }
    }

    /// Count the arrival and decide whether it carries new information.
    pub fn classify(&mut self, item: &T) -> Result<Arrival, StreamError> {
        let ts = item.timestamp();
        if self.last_timestamp != Some(ts) {
            self.last_timestamp = Some(ts);
            self.last = Some(item.clone());
            self.repeats = 0;
            return Ok(Arrival::Proceed);
        }

        self.repeats += 1;

        if self.repeats > self.threshold {
            error!(
                timestamp = %ts,
                repeats = self.repeats,
                threshold = self.threshold,
                "Repeated stream update exceeded threshold"
            );
            return Err(StreamError::Overflow {
                timestamp: ts,
                threshold: self.threshold,
            });
        }

        if self.last.as_ref() == Some(item) {
            debug!(timestamp = %ts, repeats = self.repeats, "Ignoring duplicate arrival");
            return Ok(Arrival::Ignore);
        }

        self.last = Some(item.clone());
        Ok(Arrival::Proceed)
    }

    /// Reset the repeat counter, keeping the fingerprint.
    pub fn clear_count(&mut self) {
        self.repeats = 0;
    }

    /// Drop the remembered payload if it sits at or after `from`, so the
    /// same item is admitted again after its entry was deleted.
    pub fn forget_from(&mut self, from: Timestamp) {
        if self.last_timestamp.is_some_and(|ts| ts >= from) {
            self.last = None;
        }
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeats
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}
