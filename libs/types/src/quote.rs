//! OHLCV quote, the raw input of an indicator graph

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::numeric::to_f64;
use crate::series::{Chainable, Series};
use crate::timestamp::Timestamp;

/// A single OHLCV bar or tick.
///
/// Prices and volume are `Decimal` so bar aggregation and channel extremes
/// are exact. Chains consume the close price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub timestamp: Timestamp,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Quote {
    pub fn new(
        timestamp: Timestamp,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// A quote whose four prices are all `price`.
    pub fn flat(timestamp: Timestamp, price: Decimal, volume: Decimal) -> Self {
        Self::new(timestamp, price, price, price, price, volume)
    }

    /// Fold a later quote into this bar: extremes widen, close moves, volume adds.
    pub fn merge(&mut self, later: &Quote) {
        if later.high > self.high {
            self.high = later.high;
        }
        if later.low < self.low {
            self.low = later.low;
        }
        self.close = later.close;
        self.volume += later.volume;
    }
}

impl Series for Quote {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl Chainable for Quote {
    fn value(&self) -> Option<f64> {
        to_f64(self.close)
    }
}
