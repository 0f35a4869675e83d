//! Root source of an indicator graph
//!
//! A `SourceHub` has no upstream provider: it is fed directly (quotes from a
//! feed, ticks, any `Series` item). Its cache is the source of truth, so a
//! late or corrected item is applied in place (`AddOld`/`Update`) and
//! subscribers are told to rebuild from that timestamp.

use std::cell::{Ref, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, error, info};

use types::errors::StreamError;
use types::ids::HubId;
use types::series::Series;
use types::timestamp::Timestamp;

use crate::act::Act;
use crate::cache::TimeSeriesCache;
use crate::config::HubConfig;
use crate::hub::Hub;
use crate::mutator::CacheMutator;
use crate::observer::{StreamObserver, StreamProvider};
use crate::subscription::{Subscription, SubscriptionRegistry};
use crate::transform::Transform;

/// Externally fed root hub.
pub struct SourceHub<T: Series + 'static> {
    node: Rc<SourceNode<T>>,
}

struct SourceNode<T: Series + 'static> {
    id: HubId,
    name: String,
    config: HubConfig,
    mutator: RefCell<CacheMutator<T>>,
    registry: Rc<SubscriptionRegistry<T>>,
}

impl<T: Series + 'static> SourceHub<T> {
    /// Create an empty source.
    pub fn new(name: impl Into<String>, config: HubConfig) -> Result<Self, StreamError> {
        config.validate()?;
        let name = name.into();
        let id = HubId::new();

        info!(
            hub = %name,
            hub_id = %id,
            overflow_threshold = config.overflow_threshold,
            max_cache_size = ?config.max_cache_size,
            "SourceHub initialized"
        );

        Ok(Self {
            node: Rc::new(SourceNode {
                id,
                name,
                mutator: RefCell::new(CacheMutator::new(&config)),
                config,
                registry: SubscriptionRegistry::new(),
            }),
        })
    }

    /// Create a source with default configuration.
    pub fn with_defaults(name: impl Into<String>) -> Result<Self, StreamError> {
        Self::new(name, HubConfig::default())
    }

    /// Feed one item and fan the outcome out to subscribers.
    pub fn add(&self, item: T) -> Result<Act, StreamError> {
        self.node.add(item)
    }

    /// Feed several items in timestamp order. Returns how many changed the cache.
    pub fn add_batch(&self, items: impl IntoIterator<Item = T>) -> Result<usize, StreamError> {
        let mut items: Vec<T> = items.into_iter().collect();
        items.sort_by_key(|item| item.timestamp());

        let mut changed = 0;
        for item in items {
            if self.node.add(item)? != Act::Ignore {
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Place an item at its sorted position.
    ///
    /// A root has no suffix of its own to recompute, so this is the same
    /// transition as `add`.
    pub fn insert(&self, item: T) -> Result<Act, StreamError> {
        self.node.add(item)
    }

    /// Remove a cached item and have subscribers rebuild from its timestamp.
    pub fn remove(&self, item: &T) -> Result<Act, StreamError> {
        let (act, _) = self
            .node
            .mutator
            .borrow_mut()
            .modify(Act::Delete, item.clone())?;
        self.node.registry.notify_rebuild(item.timestamp())?;
        Ok(act)
    }

    /// Remove the entry at `index` and have subscribers rebuild from its timestamp.
    pub fn remove_at(&self, index: usize) -> Result<T, StreamError> {
        let removed = self.node.mutator.borrow_mut().remove_at(index)?;
        self.node.registry.notify_rebuild(removed.timestamp())?;
        Ok(removed)
    }

    /// Remove every entry at or after `from`, newest first, notifying
    /// subscribers after each removal. Returns the number removed.
    pub fn remove_range(&self, from: Timestamp) -> Result<usize, StreamError> {
        let mut removed = 0;
        loop {
            let deleted = self.node.mutator.borrow_mut().delete_last_from(from)?;
            let Some(item) = deleted else { break };
            removed += 1;
            self.node.registry.notify_rebuild(item.timestamp())?;
        }
        debug!(hub = %self.node.name, from = %from, removed, "Removed range");
        Ok(removed)
    }

    /// Have every subscriber rebuild from scratch.
    pub fn rebuild(&self) -> Result<(), StreamError> {
        self.rebuild_from(Timestamp::MIN)
    }

    /// Re-publish from `from`: the root cache is kept, subscribers rebuild.
    pub fn rebuild_from(&self, from: Timestamp) -> Result<(), StreamError> {
        debug!(hub = %self.node.name, from = %from, "Re-publishing from timestamp");
        self.node.registry.notify_rebuild(from)
    }

    /// Re-publish from the entry at `index`. Index 0, or an empty cache,
    /// re-publishes everything.
    pub fn rebuild_from_index(&self, index: usize) -> Result<(), StreamError> {
        let from = if index == 0 || self.is_empty() {
            Timestamp::MIN
        } else {
            self.node.timestamp_at(index)?
        };
        self.rebuild_from(from)
    }

    /// Clear the fault and re-publish everything.
    pub fn reinitialize(&self) -> Result<(), StreamError> {
        self.reset_fault();
        info!(hub = %self.node.name, "SourceHub reinitialized");
        self.rebuild()
    }

    /// Clear the fault flag and overflow counter; the cache is untouched.
    pub fn reset_fault(&self) {
        self.node.mutator.borrow_mut().reset_fault();
    }

    /// Complete and drop every subscriber.
    pub fn end_transmission(&self) {
        self.node.registry.end_transmission();
    }

    /// Read-only view of the cache. Release it before feeding the graph.
    pub fn results(&self) -> Ref<'_, [T]> {
        Ref::map(self.node.mutator.borrow(), |m| m.cache().as_slice())
    }

    /// Owned copy of the cache.
    pub fn snapshot(&self) -> Vec<T> {
        self.results().to_vec()
    }

    pub fn len(&self) -> usize {
        self.node.mutator.borrow().cache().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<T> {
        self.node.mutator.borrow().cache().last().cloned()
    }

    pub fn is_faulted(&self) -> bool {
        self.node.mutator.borrow().is_faulted()
    }

    pub fn label(&self) -> String {
        self.node.name.clone()
    }

    pub fn id(&self) -> HubId {
        self.node.id
    }

    pub fn config(&self) -> &HubConfig {
        &self.node.config
    }

    pub fn has_subscribers(&self) -> bool {
        self.node.registry.has_subscribers()
    }

    pub fn subscriber_count(&self) -> usize {
        self.node.registry.len()
    }

    /// Type-erased provider handle for attaching hubs.
    pub fn provider(&self) -> Rc<dyn StreamProvider<T>> {
        self.node.clone()
    }

    /// Attach a hub computing `transform` over this source.
    pub fn chain<O, X>(&self, transform: X) -> Result<Hub<T, O, X>, StreamError>
    where
        O: Series + 'static,
        X: Transform<T, O> + 'static,
    {
        Hub::attach(self.provider(), transform, self.node.config.clone())
    }
}

impl<T: Series + 'static> Clone for SourceHub<T> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
        }
    }
}

impl<T: Series + 'static> SourceNode<T> {
    fn add(&self, item: T) -> Result<Act, StreamError> {
        let verdict = self.mutator.borrow_mut().analyze(&item);
        let act = match verdict {
            Ok(act) => act,
            Err(err) => return Err(self.fault(err)),
        };

        let (act, index) = {
            let mut mutator = self.mutator.borrow_mut();
            let act = match act {
                Act::Rebuild => mutator.resolve(&item),
                other => other,
            };
            mutator.modify(act, item.clone())?
        };

        if act.is_mutation() {
            debug!(hub = %self.name, act = %act, timestamp = %item.timestamp(), "Source cache changed");
        }

        match act {
            Act::Ignore => return Ok(act),
            Act::Add => self.registry.notify_add(&item, index)?,
            _ => self.registry.notify_rebuild(item.timestamp())?,
        }

        self.prune()?;
        Ok(act)
    }

    /// Hold the cache to its maximum size, then tell subscribers.
    fn prune(&self) -> Result<(), StreamError> {
        let pruned = self.mutator.borrow_mut().prune();
        match pruned {
            Some(to) => self.registry.notify_prune(to),
            None => Ok(()),
        }
    }

    fn timestamp_at(&self, index: usize) -> Result<Timestamp, StreamError> {
        let mutator = self.mutator.borrow();
        let cache = mutator.cache();
        cache
            .get(index)
            .map(|item| item.timestamp())
            .ok_or(StreamError::IndexOutOfRange {
                index,
                len: cache.len(),
            })
    }

    fn fault(&self, error: StreamError) -> StreamError {
        if error.is_overflow() {
            error!(hub = %self.name, error = %error, "SourceHub faulted, ending transmission");
            self.registry.notify_error(&error);
            self.registry.end_transmission();
        }
        error
    }
}

impl<T: Series + 'static> StreamProvider<T> for SourceNode<T> {
    fn provider_id(&self) -> HubId {
        self.id
    }

    fn label(&self) -> String {
        self.name.clone()
    }

    fn config(&self) -> HubConfig {
        self.config.clone()
    }

    fn cache(&self) -> Ref<'_, TimeSeriesCache<T>> {
        Ref::map(self.mutator.borrow(), |m| m.cache())
    }

    fn subscribe(&self, observer: Weak<dyn StreamObserver<T>>) -> Subscription {
        self.registry.subscribe(observer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use types::series::TimeValue;

    const MINUTE: i64 = 60 * 1_000_000_000;

    fn at(minutes: i64, value: f64) -> TimeValue {
        TimeValue::new(Timestamp::from_nanos(minutes * MINUTE), Some(value))
    }

    #[derive(Default)]
    struct Log {
        adds: RefCell<Vec<TimeValue>>,
        rebuilds: RefCell<Vec<Timestamp>>,
        prunes: RefCell<Vec<Timestamp>>,
        errors: RefCell<usize>,
        completed: RefCell<bool>,
    }

    impl StreamObserver<TimeValue> for Log {
        fn on_add(&self, item: &TimeValue, _index: Option<usize>) -> Result<(), StreamError> {
            self.adds.borrow_mut().push(*item);
            Ok(())
        }

        fn on_rebuild(&self, from: Timestamp) -> Result<(), StreamError> {
            self.rebuilds.borrow_mut().push(from);
            Ok(())
        }

        fn on_prune(&self, to: Timestamp) -> Result<(), StreamError> {
            self.prunes.borrow_mut().push(to);
            Ok(())
        }

        fn on_error(&self, _error: &StreamError) {
            *self.errors.borrow_mut() += 1;
        }

        fn on_completed(&self) {
            *self.completed.borrow_mut() = true;
        }
    }

    fn observed() -> (SourceHub<TimeValue>, Rc<Log>, Subscription) {
        let source = SourceHub::with_defaults("VALUES").unwrap();
        let log = Rc::new(Log::default());
        let weak: Weak<dyn StreamObserver<TimeValue>> = Rc::<Log>::downgrade(&log);
        let handle = source.provider().subscribe(weak);
        (source, log, handle)
    }

    #[test]
    fn test_add_to_empty_source() {
        let (source, log, _handle) = observed();
        assert_eq!(source.add(at(540, 10.0)).unwrap(), Act::Add);
        assert_eq!(source.snapshot(), vec![at(540, 10.0)]);
        assert_eq!(*log.adds.borrow(), vec![at(540, 10.0)]);
    }

    #[test]
    fn test_correction_replaces_and_republishes() {
        let (source, log, _handle) = observed();
        source.add(at(540, 10.0)).unwrap();

        assert_eq!(source.add(at(540, 12.0)).unwrap(), Act::Update);
        assert_eq!(source.snapshot(), vec![at(540, 12.0)]);
        assert_eq!(*log.rebuilds.borrow(), vec![Timestamp::from_nanos(540 * MINUTE)]);
    }

    #[test]
    fn test_late_item_inserted_in_order() {
        let (source, log, _handle) = observed();
        source.add(at(1, 1.0)).unwrap();
        source.add(at(3, 3.0)).unwrap();

        assert_eq!(source.add(at(2, 2.0)).unwrap(), Act::AddOld);
        assert_eq!(source.snapshot(), vec![at(1, 1.0), at(2, 2.0), at(3, 3.0)]);
        assert_eq!(*log.rebuilds.borrow(), vec![Timestamp::from_nanos(2 * MINUTE)]);
    }

    #[test]
    fn test_identical_redelivery_ignored() {
        let (source, log, _handle) = observed();
        source.add(at(1, 1.0)).unwrap();
        assert_eq!(source.add(at(1, 1.0)).unwrap(), Act::Ignore);
        assert_eq!(log.adds.borrow().len(), 1);
        assert!(log.rebuilds.borrow().is_empty());
    }

    #[test]
    fn test_overflow_faults_and_ends_transmission() {
        let (source, log, handle) = observed();
        source.add(at(540, 10.0)).unwrap();

        for _ in 0..100 {
            assert_eq!(source.add(at(540, 10.0)).unwrap(), Act::Ignore);
        }
        let err = source.add(at(540, 10.0)).unwrap_err();

        assert!(err.is_overflow());
        assert!(source.is_faulted());
        assert!(!source.has_subscribers());
        assert!(!handle.is_active());
        assert_eq!(*log.errors.borrow(), 1);
        assert!(*log.completed.borrow());
        assert_eq!(source.snapshot(), vec![at(540, 10.0)]);
    }

    #[test]
    fn test_reinitialize_after_fault() {
        let source = SourceHub::new("VALUES", HubConfig::default().with_overflow_threshold(1)).unwrap();
        source.add(at(1, 1.0)).unwrap();
        source.add(at(1, 1.0)).unwrap();
        assert!(source.add(at(1, 1.0)).is_err());

        source.reinitialize().unwrap();
        assert!(!source.is_faulted());
        assert_eq!(source.add(at(2, 2.0)).unwrap(), Act::Add);
    }

    #[test]
    fn test_add_batch_sorts_input() {
        let (source, log, _handle) = observed();
        let changed = source
            .add_batch(vec![at(3, 3.0), at(1, 1.0), at(2, 2.0), at(2, 2.0)])
            .unwrap();

        assert_eq!(changed, 3);
        assert_eq!(source.len(), 3);
        assert_eq!(log.adds.borrow().len(), 3);
        assert!(log.rebuilds.borrow().is_empty());
    }

    #[test]
    fn test_remove_and_remove_at() {
        let (source, log, _handle) = observed();
        source.add_batch((1..=3).map(|i| at(i, i as f64))).unwrap();

        assert_eq!(source.remove(&at(2, 2.0)).unwrap(), Act::Delete);
        assert_eq!(source.remove_at(0).unwrap(), at(1, 1.0));
        assert_eq!(source.snapshot(), vec![at(3, 3.0)]);
        assert_eq!(
            *log.rebuilds.borrow(),
            vec![Timestamp::from_nanos(2 * MINUTE), Timestamp::from_nanos(MINUTE)]
        );

        assert!(source.remove(&at(9, 9.0)).unwrap_err().is_invariant_violation());
        assert!(matches!(
            source.remove_at(5),
            Err(StreamError::IndexOutOfRange { index: 5, len: 1 })
        ));
    }

    #[test]
    fn test_remove_range_notifies_descending() {
        let (source, log, _handle) = observed();
        source.add_batch((1..=5).map(|i| at(i, i as f64))).unwrap();

        assert_eq!(source.remove_range(Timestamp::from_nanos(3 * MINUTE)).unwrap(), 3);
        assert_eq!(
            *log.rebuilds.borrow(),
            vec![
                Timestamp::from_nanos(5 * MINUTE),
                Timestamp::from_nanos(4 * MINUTE),
                Timestamp::from_nanos(3 * MINUTE),
            ]
        );
        assert_eq!(source.len(), 2);
    }

    #[test]
    fn test_rebuild_from_index() {
        let (source, log, _handle) = observed();
        source.add_batch((1..=3).map(|i| at(i, i as f64))).unwrap();

        source.rebuild_from_index(1).unwrap();
        source.rebuild().unwrap();
        assert_eq!(
            *log.rebuilds.borrow(),
            vec![Timestamp::from_nanos(2 * MINUTE), Timestamp::MIN]
        );
        assert!(source.rebuild_from_index(3).is_err());
    }

    #[test]
    fn test_rebuild_from_index_zero_on_empty_source() {
        let (source, log, _handle) = observed();

        source.rebuild_from_index(0).unwrap();
        source.rebuild_from_index(4).unwrap();
        assert_eq!(*log.rebuilds.borrow(), vec![Timestamp::MIN, Timestamp::MIN]);
    }

    #[test]
    fn test_max_cache_size_prunes_oldest() {
        let source = SourceHub::new("VALUES", HubConfig::default().with_max_cache_size(3)).unwrap();
        let log = Rc::new(Log::default());
        let weak: Weak<dyn StreamObserver<TimeValue>> = Rc::<Log>::downgrade(&log);
        let _handle = source.provider().subscribe(weak);

        source.add_batch((1..=3).map(|i| at(i, i as f64))).unwrap();
        assert!(log.prunes.borrow().is_empty());

        source.add(at(4, 4.0)).unwrap();
        source.add(at(5, 5.0)).unwrap();

        assert_eq!(source.snapshot(), vec![at(3, 3.0), at(4, 4.0), at(5, 5.0)]);
        assert_eq!(
            *log.prunes.borrow(),
            vec![Timestamp::from_nanos(MINUTE), Timestamp::from_nanos(2 * MINUTE)]
        );
        assert_eq!(log.adds.borrow().len(), 5);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = SourceHub::<TimeValue>::new("VALUES", HubConfig::default().with_overflow_threshold(0));
        assert!(matches!(result, Err(StreamError::InvalidParameter { .. })));
    }
}
