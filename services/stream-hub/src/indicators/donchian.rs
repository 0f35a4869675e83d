//! Donchian channels over quotes

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use types::errors::StreamError;
use types::numeric::to_f64;
use types::quote::Quote;
use types::series::{Chainable, Series};
use types::timestamp::Timestamp;

use crate::cache::TimeSeriesCache;
use crate::state::RollingExtreme;
use crate::transform::{Context, Transform};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonchianResult {
    pub timestamp: Timestamp,
    pub upper: Option<Decimal>,
    pub center: Option<Decimal>,
    pub lower: Option<Decimal>,
    /// Channel width relative to the center line.
    pub width: Option<Decimal>,
}

impl Series for DonchianResult {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl Chainable for DonchianResult {
    fn value(&self) -> Option<f64> {
        self.center.and_then(to_f64)
    }
}

/// Highest high and lowest low of the `lookback` quotes before the current
/// one. The first `lookback` results carry no channel.
#[derive(Debug, Clone)]
pub struct Donchian {
    lookback: usize,
    highs: RollingExtreme<Decimal>,
    lows: RollingExtreme<Decimal>,
}

impl Donchian {
    pub fn new(lookback: usize) -> Result<Self, StreamError> {
        if lookback == 0 {
            return Err(StreamError::invalid_parameter(
                "lookback",
                "must be greater than zero",
            ));
        }
        Ok(Self {
            lookback,
            highs: RollingExtreme::highest(lookback),
            lows: RollingExtreme::lowest(lookback),
        })
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    /// Rebuild both windows from the quotes just before `index`.
    fn reprime(&mut self, index: usize, provider: &TimeSeriesCache<Quote>) {
        self.highs.clear();
        self.lows.clear();
        let end = index.min(provider.len());
        for i in end.saturating_sub(self.lookback)..end {
            self.highs.push(i, provider[i].high);
            self.lows.push(i, provider[i].low);
        }
    }

    fn channel(&self, index: usize, timestamp: Timestamp) -> DonchianResult {
        let (upper, lower) = if index >= self.lookback {
            (self.highs.current(), self.lows.current())
        } else {
            (None, None)
        };

        let center = upper.zip(lower).map(|(u, l)| (u + l) / Decimal::TWO);
        let width = match (upper, lower, center) {
            (Some(u), Some(l), Some(c)) if !c.is_zero() => Some((u - l) / c),
            _ => None,
        };

        DonchianResult {
            timestamp,
            upper,
            center,
            lower,
            width,
        }
    }
}

impl Transform<Quote, DonchianResult> for Donchian {
    fn transform(
        &mut self,
        input: &Quote,
        index: usize,
        ctx: &Context<'_, Quote, DonchianResult>,
    ) -> Result<DonchianResult, StreamError> {
        let sequential = match self.highs.last_index() {
            Some(last) => last + 1 == index,
            None => index == 0,
        };
        if !sequential {
            self.reprime(index, ctx.provider);
        }

        let result = self.channel(index, input.timestamp);
        self.highs.push(index, input.high);
        self.lows.push(index, input.low);
        Ok(result)
    }

    fn label(&self) -> String {
        format!("DONCHIAN({})", self.lookback)
    }

    fn rollback(&mut self, at: Timestamp, ctx: &Context<'_, Quote, DonchianResult>) {
        let index = ctx
            .provider
            .first_index_at_or_after(at)
            .unwrap_or(ctx.provider.len());
        self.reprime(index, ctx.provider);
    }
}
