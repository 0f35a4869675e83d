//! Concrete transforms
//!
//! Each indicator validates its parameters in `new` and implements
//! `Transform` for the inputs it accepts. Moving averages take any
//! `Chainable` series, so they can be stacked on each other.

pub mod aggregator;
pub mod donchian;
pub mod ema;
pub mod quote_part;
pub mod sma;

pub use aggregator::{BarPeriod, QuoteAggregator};
pub use donchian::{Donchian, DonchianResult};
pub use ema::{Ema, EmaResult};
pub use quote_part::QuotePart;
pub use sma::{Sma, SmaResult};
