//! Quote aggregation into fixed-period bars
//!
//! Bars are aligned to the epoch: a 1-minute bar opens on a minute boundary
//! and absorbs every quote stamped before the next one. Periods without
//! quotes produce no bar.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use types::errors::StreamError;
use types::quote::Quote;
use types::timestamp::Timestamp;

use crate::transform::{Context, Transform};

/// Standard bar periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BarPeriod {
    /// 1 minute
    M1,
    /// 5 minutes
    M5,
    /// 15 minutes
    M15,
    /// 30 minutes
    M30,
    /// 1 hour
    H1,
    /// 4 hours
    H4,
    /// 1 day
    D1,
    /// 1 week
    W1,
}

impl BarPeriod {
    pub fn duration_nanos(&self) -> i64 {
        match self {
            BarPeriod::M1 => 60 * 1_000_000_000,
            BarPeriod::M5 => 5 * 60 * 1_000_000_000,
            BarPeriod::M15 => 15 * 60 * 1_000_000_000,
            BarPeriod::M30 => 30 * 60 * 1_000_000_000,
            BarPeriod::H1 => 3600 * 1_000_000_000,
            BarPeriod::H4 => 4 * 3600 * 1_000_000_000,
            BarPeriod::D1 => 86400 * 1_000_000_000_i64,
            BarPeriod::W1 => 7 * 86400 * 1_000_000_000_i64,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BarPeriod::M1 => "1m",
            BarPeriod::M5 => "5m",
            BarPeriod::M15 => "15m",
            BarPeriod::M30 => "30m",
            BarPeriod::H1 => "1h",
            BarPeriod::H4 => "4h",
            BarPeriod::D1 => "1d",
            BarPeriod::W1 => "1w",
        }
    }
}

/// Folds quotes (or ticks expressed as quotes) into bars of one period.
///
/// Consecutive quotes in the same bar revise the newest result in place, so
/// a bar may absorb any number of ticks without tripping the repeat guard.
/// A late or corrected quote rebuilds from the start of its bar.
#[derive(Debug, Clone)]
pub struct QuoteAggregator {
    period_nanos: i64,
    label: String,
}

impl QuoteAggregator {
    pub fn new(period: BarPeriod) -> Self {
        Self {
            period_nanos: period.duration_nanos(),
            label: format!("QUOTES({})", period.as_str()),
        }
    }

    /// Aggregate into bars of an arbitrary positive duration.
    pub fn with_duration(period: Duration) -> Result<Self, StreamError> {
        let period_nanos = period
            .num_nanoseconds()
            .filter(|nanos| *nanos > 0)
            .ok_or_else(|| {
                StreamError::invalid_parameter("period", "must be a positive duration")
            })?;
        Ok(Self {
            period_nanos,
            label: format!("QUOTES({}ns)", period_nanos),
        })
    }

    pub fn period_nanos(&self) -> i64 {
        self.period_nanos
    }

    /// Open time of the bar containing `ts`.
    pub fn bar_start(&self, ts: Timestamp) -> Timestamp {
        ts.floor(self.period_nanos)
    }
}

impl Transform<Quote, Quote> for QuoteAggregator {
    fn transform(
        &mut self,
        input: &Quote,
        _index: usize,
        ctx: &Context<'_, Quote, Quote>,
    ) -> Result<Quote, StreamError> {
        let start = self.bar_start(input.timestamp);

        match ctx.results.last() {
            Some(bar) if bar.timestamp == start => {
                let mut bar = bar.clone();
                bar.merge(input);
                Ok(bar)
            }
            _ => {
                let mut bar = input.clone();
                bar.timestamp = start;
                Ok(bar)
            }
        }
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn rebuild_origin(&self, from: Timestamp) -> Timestamp {
        if from == Timestamp::MIN {
            return from;
        }
        self.bar_start(from)
    }

    fn revises_in_place(&self) -> bool {
        true
    }
}
