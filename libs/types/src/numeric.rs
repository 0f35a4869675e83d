//! Numeric boundary helpers
//!
//! Quotes carry `Decimal` prices so aggregation and comparison stay exact.
//! Indicator formulas run on `f64`; these helpers convert at that boundary
//! and keep NaN/infinite values out of caches (they become `None`).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Convert a decimal price to `f64` for indicator math.
pub fn to_f64(value: Decimal) -> Option<f64> {
    value.to_f64().and_then(finite)
}

/// Map NaN and infinities to `None`.
pub fn finite(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}
