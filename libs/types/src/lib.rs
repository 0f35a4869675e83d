//! Types library for the streaming indicator hub
//!
//! This library provides the value types shared by every node of the
//! indicator graph: the ordering key, the raw quote, the item traits a
//! cache can hold, identifiers and the error taxonomy.
//!
//! # Modules
//! - `ids`: Unique identifiers (HubId, SubscriptionId)
//! - `timestamp`: Nanosecond ordering key with bar alignment
//! - `numeric`: Decimal/float conversion at the chain-value boundary
//! - `series`: `Series` and `Chainable` item traits, `TimeValue`
//! - `quote`: OHLCV quote
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod timestamp;
pub mod numeric;
pub mod series;
pub mod quote;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::timestamp::*;
    pub use crate::numeric::*;
    pub use crate::series::*;
    pub use crate::quote::*;
    pub use crate::errors::*;
}
