//! Project a quote onto a single chainable value

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use types::errors::StreamError;
use types::numeric::to_f64;
use types::quote::Quote;
use types::series::TimeValue;

use crate::transform::{Context, Transform};

/// Which price (or blend of prices) a `QuotePart` hub emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotePart {
    Open,
    High,
    Low,
    Close,
    Volume,
    /// (high + low) / 2
    HL2,
    /// (high + low + close) / 3
    HLC3,
    /// (open + close) / 2
    OC2,
    /// (open + high + low) / 3
    OHL3,
    /// (open + high + low + close) / 4
    OHLC4,
}

impl QuotePart {
    pub fn select(&self, quote: &Quote) -> Decimal {
        match self {
            QuotePart::Open => quote.open,
            QuotePart::High => quote.high,
            QuotePart::Low => quote.low,
            QuotePart::Close => quote.close,
            QuotePart::Volume => quote.volume,
            QuotePart::HL2 => (quote.high + quote.low) / Decimal::TWO,
            QuotePart::HLC3 => (quote.high + quote.low + quote.close) / Decimal::from(3),
            QuotePart::OC2 => (quote.open + quote.close) / Decimal::TWO,
            QuotePart::OHL3 => (quote.open + quote.high + quote.low) / Decimal::from(3),
            QuotePart::OHLC4 => {
                (quote.open + quote.high + quote.low + quote.close) / Decimal::from(4)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuotePart::Open => "OPEN",
            QuotePart::High => "HIGH",
            QuotePart::Low => "LOW",
            QuotePart::Close => "CLOSE",
            QuotePart::Volume => "VOLUME",
            QuotePart::HL2 => "HL2",
            QuotePart::HLC3 => "HLC3",
            QuotePart::OC2 => "OC2",
            QuotePart::OHL3 => "OHL3",
            QuotePart::OHLC4 => "OHLC4",
        }
    }
}

impl fmt::Display for QuotePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Transform<Quote, TimeValue> for QuotePart {
    fn transform(
        &mut self,
        input: &Quote,
        _index: usize,
        _ctx: &Context<'_, Quote, TimeValue>,
    ) -> Result<TimeValue, StreamError> {
        Ok(TimeValue::new(input.timestamp, to_f64(self.select(input))))
    }

    fn label(&self) -> String {
        format!("QUOTEPART({})", self.as_str())
    }
}
