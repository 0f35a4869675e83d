//! Provider and observer contracts
//!
//! A provider exposes a read-only view of its cache and accepts
//! subscriptions; an observer receives five kinds of events. Hubs implement
//! both. The graph is single threaded: handles are `Rc`, subscribers are
//! held as `Weak`, and no `RefCell` borrow is held while events are
//! delivered, so an observer may freely read its provider's cache.

use std::cell::Ref;
use std::rc::Weak;

use types::errors::StreamError;
use types::ids::HubId;
use types::timestamp::Timestamp;

use crate::cache::TimeSeriesCache;
use crate::config::HubConfig;
use crate::subscription::Subscription;

/// Downstream half of a graph edge.
pub trait StreamObserver<T> {
    /// A new item was appended at `index` of the provider's cache.
    fn on_add(&self, item: &T, index: Option<usize>) -> Result<(), StreamError>;

    /// The provider's cache changed at or after `from`.
    fn on_rebuild(&self, from: Timestamp) -> Result<(), StreamError>;

    /// The provider dropped every entry at or before `to` to stay within
    /// its maximum cache size. Observers that keep no cache can ignore it.
    fn on_prune(&self, _to: Timestamp) -> Result<(), StreamError> {
        Ok(())
    }

    /// The provider faulted. The error itself travels back up the call
    /// stack to whoever fed the graph; this is the fan-out signal.
    fn on_error(&self, error: &StreamError);

    /// The provider ended transmission; no further events will arrive.
    fn on_completed(&self);
}

/// Upstream half of a graph edge.
pub trait StreamProvider<T> {
    fn provider_id(&self) -> HubId;

    fn label(&self) -> String;

    /// Configuration inherited by hubs chained from this provider.
    fn config(&self) -> HubConfig;

    /// Read-only view of the published cache.
    ///
    /// Do not hold the guard across a call that mutates the graph.
    fn cache(&self) -> Ref<'_, TimeSeriesCache<T>>;

    fn subscribe(&self, observer: Weak<dyn StreamObserver<T>>) -> Subscription;
}
