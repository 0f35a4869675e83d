//! Ordering key for every cached item
//!
//! A `Timestamp` is Unix time in nanoseconds. Caches are ordered by it and
//! hold at most one visible entry per value.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix-epoch nanoseconds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Earliest representable instant; rebuilding from here replays everything.
    pub const MIN: Timestamp = Timestamp(i64::MIN);

    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub const fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Convert from a UTC datetime. Returns `None` outside the i64 nanosecond range.
    pub fn from_datetime(dt: DateTime<Utc>) -> Option<Self> {
        dt.timestamp_nanos_opt().map(Self)
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_nanos(self.0)
    }

    /// Align down to a period boundary measured from the epoch.
    ///
    /// Uses euclidean division so pre-epoch instants floor toward the past.
    /// A non-positive period leaves the timestamp unchanged.
    pub fn floor(&self, period_nanos: i64) -> Self {
        if period_nanos <= 0 {
            return *self;
        }
        Self(self.0.div_euclid(period_nanos) * period_nanos)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    /// Saturates at the i64 nanosecond range.
    fn from(dt: DateTime<Utc>) -> Self {
        match dt.timestamp_nanos_opt() {
            Some(nanos) => Self(nanos),
            None if dt.timestamp() < 0 => Self(i64::MIN),
            None => Self(i64::MAX),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::MIN {
            return write!(f, "-inf");
        }
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}
