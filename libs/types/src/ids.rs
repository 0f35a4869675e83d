//! Identifiers for graph nodes and subscriptions
//!
//! Both are UUID v7, so an id created later sorts later and log lines from
//! one graph can be ordered by creation.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! time_ordered_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

time_ordered_id!(
    /// A hub: one node of the indicator graph.
    HubId
);

time_ordered_id!(
    /// One observer registration on one provider. Every handle for the
    /// registration carries the same id.
    SubscriptionId
);
