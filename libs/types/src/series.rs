//! Item traits for cached time series
//!
//! Every cache entry is a `Series` item: it has an ordering timestamp and a
//! payload compared field by field. Items that can feed another indicator
//! additionally implement `Chainable`, which exposes a single numeric value.
//! One cache serves both purposes; there is no separate chain mirror.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::timestamp::Timestamp;

/// A timestamped, immutable-once-computed item.
///
/// `PartialEq` must compare the full payload, not only the timestamp: two
/// items at the same instant with different values are a correction, not a
/// duplicate.
pub trait Series: Clone + PartialEq + fmt::Debug {
    fn timestamp(&self) -> Timestamp;
}

/// An item whose single value can be consumed by a downstream indicator.
pub trait Chainable: Series {
    /// `None` marks a warm-up or undefined period.
    fn value(&self) -> Option<f64>;
}

/// The simplest chainable item: a timestamp and a nullable value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeValue {
    pub timestamp: Timestamp,
    pub value: Option<f64>,
}

impl TimeValue {
    pub fn new(timestamp: Timestamp, value: Option<f64>) -> Self {
        Self { timestamp, value }
    }
}

impl Series for TimeValue {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl Chainable for TimeValue {
    fn value(&self) -> Option<f64> {
        self.value
    }
}
