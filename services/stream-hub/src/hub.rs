//! Chained hub: a cache computed from an upstream provider
//!
//! A `Hub` is simultaneously an observer of its provider and a provider for
//! its own subscribers. Every provider item is passed through the hub's
//! `Transform`; new results are appended and fanned out, and anything that
//! is not strictly newer than the last result triggers a rebuild:
//!
//! 1. truncate own results at the rebuild origin
//! 2. let the transform roll back auxiliary state
//! 3. replay provider entries from the origin (no per-item fan-out)
//! 4. tell every subscriber to rebuild from the same origin
//!
//! Subscribers recurse depth-first, so when a call into the graph returns
//! every level has settled.
//!
//! With a maximum cache size configured, a hub drops its oldest results once
//! it grows past the limit and whenever its provider prunes, and passes the
//! prune on to its own subscribers.

use std::cell::{Ref, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, error, info, warn};

use types::errors::StreamError;
use types::ids::HubId;
use types::series::Series;
use types::timestamp::Timestamp;

use crate::act::Act;
use crate::cache::TimeSeriesCache;
use crate::config::HubConfig;
use crate::mutator::CacheMutator;
use crate::observer::{StreamObserver, StreamProvider};
use crate::subscription::{Subscription, SubscriptionRegistry};
use crate::transform::{resolve_index, Context, Transform};

/// Handle to a hub computing `X: Transform<I, O>` over a provider of `I`.
pub struct Hub<I, O, X>
where
    I: Series + 'static,
    O: Series + 'static,
    X: Transform<I, O> + 'static,
{
    node: Rc<HubNode<I, O, X>>,
}

struct HubNode<I, O, X>
where
    I: Series + 'static,
    O: Series + 'static,
    X: Transform<I, O> + 'static,
{
    id: HubId,
    label: String,
    config: HubConfig,
    provider: Rc<dyn StreamProvider<I>>,
    core: RefCell<HubCore<O, X>>,
    registry: Rc<SubscriptionRegistry<O>>,
    subscription: RefCell<Option<Subscription>>,
    this: Weak<HubNode<I, O, X>>,
}

struct HubCore<O, X> {
    mutator: CacheMutator<O>,
    transform: X,
}

/// Outcome of classifying one provider item, decided while borrows are held
/// and acted on after they are released.
enum Step<O> {
    Ignored,
    Appended(O, usize),
    Revised(Timestamp),
    Rebuild(Timestamp),
}

impl<I, O, X> Hub<I, O, X>
where
    I: Series + 'static,
    O: Series + 'static,
    X: Transform<I, O> + 'static,
{
    /// Bind a transform to a provider: full rebuild from the provider's
    /// current cache, then subscribe to its future events.
    pub fn attach(
        provider: Rc<dyn StreamProvider<I>>,
        transform: X,
        config: HubConfig,
    ) -> Result<Self, StreamError> {
        config.validate()?;
        let label = transform.label();
        let id = HubId::new();

        let node = Rc::new_cyclic(|this| HubNode {
            id,
            label,
            config: config.clone(),
            provider,
            core: RefCell::new(HubCore {
                mutator: CacheMutator::new(&config),
                transform,
            }),
            registry: SubscriptionRegistry::new(),
            subscription: RefCell::new(None),
            this: this.clone(),
        });

        node.reinitialize()?;

        info!(
            hub = %node.label,
            hub_id = %node.id,
            provider = %node.provider.label(),
            cached = node.len(),
            max_cache_size = ?node.config.max_cache_size,
            "Hub initialized"
        );

        Ok(Self { node })
    }

    /// Feed an input item that is already present in the provider cache.
    pub fn add(&self, item: I) -> Result<Act, StreamError> {
        self.node.arrive(&item, None)
    }

    /// Feed several provider items in timestamp order. Returns how many
    /// were not ignored.
    pub fn add_batch(&self, items: impl IntoIterator<Item = I>) -> Result<usize, StreamError> {
        let mut items: Vec<I> = items.into_iter().collect();
        items.sort_by_key(|item| item.timestamp());

        let mut changed = 0;
        for item in &items {
            if self.node.arrive(item, None)? != Act::Ignore {
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Place the result for `item` without recomputing this hub's later
    /// results; subscribers still rebuild from its timestamp.
    ///
    /// Only correct when the caller knows no later result depends on the
    /// inserted one. Nothing checks this.
    pub fn insert(&self, item: I) -> Result<Act, StreamError> {
        self.node.insert(&item)
    }

    /// Remove a result and have subscribers rebuild from its timestamp.
    pub fn remove(&self, item: &O) -> Result<Act, StreamError> {
        let (act, _) = self
            .node
            .core
            .borrow_mut()
            .mutator
            .modify(Act::Delete, item.clone())?;
        self.node.registry.notify_rebuild(item.timestamp())?;
        Ok(act)
    }

    /// Remove the result at `index` and have subscribers rebuild from its timestamp.
    pub fn remove_at(&self, index: usize) -> Result<O, StreamError> {
        let removed = self.node.core.borrow_mut().mutator.remove_at(index)?;
        self.node.registry.notify_rebuild(removed.timestamp())?;
        Ok(removed)
    }

    /// Remove every result at or after `from`, newest first, notifying
    /// subscribers after each removal. Returns the number removed.
    pub fn remove_range(&self, from: Timestamp) -> Result<usize, StreamError> {
        self.node.remove_range(from)
    }

    /// Recompute everything from the provider.
    pub fn rebuild(&self) -> Result<(), StreamError> {
        self.node.rebuild_from(Timestamp::MIN)
    }

    /// Recompute results at or after `from`.
    pub fn rebuild_from(&self, from: Timestamp) -> Result<(), StreamError> {
        self.node.rebuild_from(from)
    }

    /// Recompute results from the entry at `index`. Index 0, or an empty
    /// cache, recomputes everything.
    pub fn rebuild_from_index(&self, index: usize) -> Result<(), StreamError> {
        let from = {
            let core = self.node.core.borrow();
            let cache = core.mutator.cache();
            if index == 0 || cache.is_empty() {
                Timestamp::MIN
            } else {
                cache
                    .get(index)
                    .map(|item| item.timestamp())
                    .ok_or(StreamError::IndexOutOfRange {
                        index,
                        len: cache.len(),
                    })?
            }
        };
        self.node.rebuild_from(from)
    }

    /// Unsubscribe, clear the fault, rebuild fully, resubscribe.
    pub fn reinitialize(&self) -> Result<(), StreamError> {
        self.node.reinitialize()
    }

    /// Clear the fault flag and overflow counter; the cache is untouched.
    pub fn reset_fault(&self) {
        self.node.core.borrow_mut().mutator.reset_fault();
    }

    /// Stop receiving provider events. Idempotent; keeps the cache.
    pub fn unsubscribe(&self) {
        self.node.unsubscribe();
    }

    pub fn is_subscribed(&self) -> bool {
        self.node
            .subscription
            .borrow()
            .as_ref()
            .is_some_and(|subscription| subscription.is_active())
    }

    /// Complete and drop every subscriber of this hub.
    pub fn end_transmission(&self) {
        self.node.registry.end_transmission();
    }

    /// Read-only view of the results. Release it before feeding the graph.
    pub fn results(&self) -> Ref<'_, [O]> {
        Ref::map(self.node.core.borrow(), |core| core.mutator.cache().as_slice())
    }

    /// Owned copy of the results.
    pub fn snapshot(&self) -> Vec<O> {
        self.results().to_vec()
    }

    pub fn len(&self) -> usize {
        self.node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<O> {
        self.node.core.borrow().mutator.cache().last().cloned()
    }

    pub fn is_faulted(&self) -> bool {
        self.node.core.borrow().mutator.is_faulted()
    }

    pub fn label(&self) -> String {
        self.node.label.clone()
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

    /// Inspect the transform, e.g. to read its parameters.
    pub fn with_transform<R>(&self, f: impl FnOnce(&X) -> R) -> R {
        f(&self.node.core.borrow().transform)
    }

    /// Type-erased provider handle for attaching further hubs.
    pub fn provider(&self) -> Rc<dyn StreamProvider<O>> {
        self.node.clone()
    }

    /// Attach a hub computing `transform` over this hub's results,
    /// inheriting this hub's configuration.
    pub fn chain<P, Y>(&self, transform: Y) -> Result<Hub<O, P, Y>, StreamError>
    where
        P: Series + 'static,
        Y: Transform<O, P> + 'static,
    {
        Hub::attach(self.provider(), transform, self.node.config.clone())
    }
}

impl<I, O, X> Clone for Hub<I, O, X>
where
    I: Series + 'static,
    O: Series + 'static,
    X: Transform<I, O> + 'static,
{
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
        }
    }
}

impl<I, O, X> HubNode<I, O, X>
where
    I: Series + 'static,
    O: Series + 'static,
    X: Transform<I, O> + 'static,
{
    fn len(&self) -> usize {
        self.core.borrow().mutator.cache().len()
    }

    /// Classify and apply one provider item, then fan out.
    fn arrive(&self, item: &I, hint: Option<usize>) -> Result<Act, StreamError> {
        let step = match self.classify(item, hint) {
            Ok(step) => step,
            Err(err) => return Err(self.fault(err)),
        };

        match step {
            Step::Ignored => Ok(Act::Ignore),
            Step::Appended(result, index) => {
                self.registry.notify_add(&result, Some(index))?;
                self.prune()?;
                Ok(Act::Add)
            }
            Step::Revised(ts) => {
                self.registry.notify_rebuild(ts)?;
                Ok(Act::Update)
            }
            Step::Rebuild(ts) => {
                self.rebuild_from(ts)?;
                Ok(Act::Rebuild)
            }
        }
    }

    fn classify(&self, item: &I, hint: Option<usize>) -> Result<Step<O>, StreamError> {
        let guard = self.provider.cache();
        let provider: &TimeSeriesCache<I> = &guard;
        let mut core = self.core.borrow_mut();
        let HubCore { mutator, transform } = &mut *core;

        let index = resolve_index(provider, item, hint)?;
        let result = transform.transform(item, index, &Context::new(provider, mutator.cache()))?;

        let act = if transform.revises_in_place() {
            mutator.analyze_revision(&result)?
        } else {
            mutator.analyze(&result)?
        };

        match act {
            Act::Ignore => Ok(Step::Ignored),
            Act::Add => {
                mutator.modify(Act::Add, result.clone())?;
                let index = mutator.cache().len().saturating_sub(1);
                Ok(Step::Appended(result, index))
            }
            Act::Update => {
                let ts = result.timestamp();
                match mutator.modify(Act::Update, result)? {
                    (Act::Ignore, _) => Ok(Step::Ignored),
                    _ => Ok(Step::Revised(ts)),
                }
            }
            _ => Ok(Step::Rebuild(result.timestamp())),
        }
    }

    fn insert(&self, item: &I) -> Result<Act, StreamError> {
        let placed = self.place(item);
        let (act, result, index) = match placed {
            Ok(placed) => placed,
            Err(err) => return Err(self.fault(err)),
        };

        match act {
            Act::Ignore => return Ok(act),
            Act::Add => self.registry.notify_add(&result, index)?,
            _ => self.registry.notify_rebuild(result.timestamp())?,
        }

        self.prune()?;
        Ok(act)
    }

    fn place(&self, item: &I) -> Result<(Act, O, Option<usize>), StreamError> {
        let guard = self.provider.cache();
        let provider: &TimeSeriesCache<I> = &guard;
        let mut core = self.core.borrow_mut();
        let HubCore { mutator, transform } = &mut *core;

        let index = resolve_index(provider, item, None)?;
        let result = transform.transform(item, index, &Context::new(provider, mutator.cache()))?;

        let act = match mutator.analyze(&result)? {
            Act::Rebuild => mutator.resolve(&result),
            act => act,
        };
        let (act, at) = mutator.modify(act, result.clone())?;
        Ok((act, result, at))
    }

    fn remove_range(&self, from: Timestamp) -> Result<usize, StreamError> {
        let mut removed = 0;
        loop {
            let deleted = self.core.borrow_mut().mutator.delete_last_from(from)?;
            let Some(item) = deleted else { break };
            removed += 1;
            self.registry.notify_rebuild(item.timestamp())?;
        }

        {
            let guard = self.provider.cache();
            let provider: &TimeSeriesCache<I> = &guard;
            let mut core = self.core.borrow_mut();
            let HubCore { mutator, transform } = &mut *core;
            transform.rollback(from, &Context::new(provider, mutator.cache()));
        }

        debug!(hub = %self.label, from = %from, removed, "Removed range");
        Ok(removed)
    }

    fn rebuild_from(&self, from: Timestamp) -> Result<(), StreamError> {
        let (origin, replayed) = self.replay(from)?;
        debug!(
            hub = %self.label,
            from = %origin,
            replayed,
            cached = self.len(),
            "Rebuilt cache"
        );
        self.registry.notify_rebuild(origin)?;
        self.prune()
    }

    /// Hold the cache to its maximum size, then tell subscribers.
    fn prune(&self) -> Result<(), StreamError> {
        let pruned = self.core.borrow_mut().mutator.prune();
        match pruned {
            Some(to) => self.registry.notify_prune(to),
            None => Ok(()),
        }
    }

    /// Truncate, roll back and recompute from the provider. No fan-out.
    fn replay(&self, from: Timestamp) -> Result<(Timestamp, usize), StreamError> {
        let guard = self.provider.cache();
        let provider: &TimeSeriesCache<I> = &guard;
        let mut core = self.core.borrow_mut();
        let HubCore { mutator, transform } = &mut *core;

        let origin = transform.rebuild_origin(from);
        mutator.truncate_from(origin);
        transform.rollback(origin, &Context::new(provider, mutator.cache()));

        let Some(start) = provider.first_index_at_or_after(origin) else {
            return Ok((origin, 0));
        };

        for index in start..provider.len() {
            let result = transform.transform(
                &provider[index],
                index,
                &Context::new(provider, mutator.cache()),
            )?;
            mutator.settle(result)?;
        }

        Ok((origin, provider.len() - start))
    }

    fn reinitialize(&self) -> Result<(), StreamError> {
        self.unsubscribe();
        self.core.borrow_mut().mutator.reset_fault();
        self.rebuild_from(Timestamp::MIN)?;
        self.subscribe_to_provider();
        debug!(hub = %self.label, provider = %self.provider.label(), "Hub subscribed");
        Ok(())
    }

    fn subscribe_to_provider(&self) {
        let observer: Weak<dyn StreamObserver<I>> = self.this.clone();
        let subscription = self.provider.subscribe(observer);
        *self.subscription.borrow_mut() = Some(subscription);
    }

    fn unsubscribe(&self) {
        let previous = self.subscription.borrow_mut().take();
        if let Some(subscription) = previous {
            debug!(hub = %self.label, subscription = %subscription.id(), "Hub unsubscribed");
            subscription.dispose();
        }
    }

    fn fault(&self, error: StreamError) -> StreamError {
        if error.is_overflow() {
            error!(hub = %self.label, error = %error, "Hub faulted, ending transmission");
            self.registry.notify_error(&error);
            self.registry.end_transmission();
        }
        error
    }
}

impl<I, O, X> StreamObserver<I> for HubNode<I, O, X>
where
    I: Series + 'static,
    O: Series + 'static,
    X: Transform<I, O> + 'static,
{
    fn on_add(&self, item: &I, index: Option<usize>) -> Result<(), StreamError> {
        self.arrive(item, index).map(|_| ())
    }

    fn on_rebuild(&self, from: Timestamp) -> Result<(), StreamError> {
        self.rebuild_from(from)
    }

    fn on_prune(&self, to: Timestamp) -> Result<(), StreamError> {
        let removed = self.core.borrow_mut().mutator.prune_through(to);
        if removed == 0 {
            return Ok(());
        }
        debug!(hub = %self.label, to = %to, removed, "Pruned with provider");
        self.registry.notify_prune(to)
    }

    fn on_error(&self, error: &StreamError) {
        warn!(hub = %self.label, provider = %self.provider.label(), error = %error, "Provider faulted");
        self.registry.notify_error(error);
    }

    fn on_completed(&self) {
        debug!(hub = %self.label, "Provider completed");
        self.unsubscribe();
    }
}

impl<I, O, X> StreamProvider<O> for HubNode<I, O, X>
where
    I: Series + 'static,
    O: Series + 'static,
    X: Transform<I, O> + 'static,
{
    fn provider_id(&self) -> HubId {
        self.id
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn config(&self) -> HubConfig {
        self.config.clone()
    }

    fn cache(&self) -> Ref<'_, TimeSeriesCache<O>> {
        Ref::map(self.core.borrow(), |core| core.mutator.cache())
    }

    fn subscribe(&self, observer: Weak<dyn StreamObserver<O>>) -> Subscription {
        self.registry.subscribe(observer)
    }
}
