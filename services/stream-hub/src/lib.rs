//! Stream Hub
//!
//! Incremental engine for chained technical indicators:
//! - Time-ordered caches per node, kept strictly ascending
//! - Late, corrected and deleted inputs repaired by suffix rebuilds
//! - Depth-first fan-out to chained hubs
//! - Circuit breaker for runaway same-timestamp repeats
//! - Optional pruning of the oldest entries past a maximum cache size
//!
//! Every hub's cache equals what a from-scratch computation over its
//! provider's current cache would produce, once a call into the graph
//! returns.
//!
//! # Architecture
//!
//! ```text
//!   Quotes / values
//!        │
//!  ┌─────▼─────┐
//!  │ SourceHub │  ← Analyze/Modify, no upstream
//!  └─────┬─────┘
//!        │ on_add / on_rebuild
//!   ┌────┴─────────┐
//!   │              │
//! ┌─▼───┐     ┌────▼─────┐
//! │ Hub │     │   Hub    │  ← Transform + own cache
//! └─┬───┘     └────┬─────┘
//!   │              │
//! ┌─▼───┐     ┌────▼─────┐
//! │ Hub │     │ Observer │
//! └─────┘     └──────────┘
//! ```
//!
//! The graph is single threaded. A host that feeds it from several threads
//! serializes calls itself.

pub mod act;
pub mod cache;
pub mod config;
pub mod hub;
pub mod indicators;
pub mod mutator;
pub mod observer;
pub mod overflow;
pub mod source;
pub mod state;
pub mod subscription;
pub mod transform;

pub use act::Act;
pub use cache::TimeSeriesCache;
pub use config::HubConfig;
pub use hub::Hub;
pub use observer::{StreamObserver, StreamProvider};
pub use source::SourceHub;
pub use subscription::{Subscription, SubscriptionRegistry};
pub use transform::{Context, Transform};

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
