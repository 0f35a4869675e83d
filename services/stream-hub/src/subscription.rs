//! Subscription registry and disposable subscription handles
//!
//! Observers are held as `Weak` references in registration order; an
//! observer that has been dropped is pruned lazily the next time the
//! registry is walked. Every notification iterates a snapshot of the live
//! set, so an observer may unsubscribe itself (or a sibling) while an event
//! is being delivered.
//!
//! Subscribing an observer that is already registered shares its
//! registration: every handle counts, and the registration goes away with
//! the last one.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use types::errors::StreamError;
use types::ids::SubscriptionId;
use types::timestamp::Timestamp;

use crate::observer::StreamObserver;

/// Registry side of a handle, erased over the item type.
trait Unsubscribe {
    fn release(&self, id: SubscriptionId);
    fn contains(&self, id: SubscriptionId) -> bool;
}

/// Handle for one observer registration.
///
/// Dropping (or `dispose`-ing) the handle releases its hold on the
/// registration, which is removed once no handle holds it. The provider may
/// also remove it first, via `end_transmission`.
pub struct Subscription {
    id: SubscriptionId,
    registry: Weak<dyn Unsubscribe>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Whether the provider still delivers events through this registration.
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.contains(self.id))
    }

    /// Release the registration now.
    pub fn dispose(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.release(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

struct Entry<T> {
    id: SubscriptionId,
    observer: Weak<dyn StreamObserver<T>>,
    handles: usize,
}

/// Downstream observers of one provider.
pub struct SubscriptionRegistry<T> {
    entries: RefCell<Vec<Entry<T>>>,
}

impl<T: 'static> SubscriptionRegistry<T> {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            entries: RefCell::new(Vec::new()),
        })
    }

    /// Register an observer.
    ///
    /// Registering an observer that is already present adds a handle to its
    /// registration; it is still notified once per event.
    pub fn subscribe(self: &Rc<Self>, observer: Weak<dyn StreamObserver<T>>) -> Subscription {
        let id = {
            let mut entries = self.entries.borrow_mut();
            match entries
                .iter_mut()
                .find(|entry| Weak::ptr_eq(&entry.observer, &observer))
            {
                Some(entry) => {
                    entry.handles += 1;
                    debug!(subscription = %entry.id, handles = entry.handles, "Observer already subscribed");
                    entry.id
                }
                None => {
                    let id = SubscriptionId::new();
                    entries.push(Entry {
                        id,
                        observer,
                        handles: 1,
                    });
                    id
                }
            }
        };

        let registry: Rc<dyn Unsubscribe> = self.clone();
        Subscription {
            id,
            registry: Rc::downgrade(&registry),
        }
    }

    /// Remove a registration by observer identity, whatever handles hold it.
    /// Every handle issued for it becomes inactive.
    pub fn unsubscribe(&self, observer: &Weak<dyn StreamObserver<T>>) -> bool {
        let id = self
            .entries
            .borrow()
            .iter()
            .find(|entry| Weak::ptr_eq(&entry.observer, observer))
            .map(|entry| entry.id);
        match id {
            Some(id) => self.remove(id),
            None => false,
        }
    }

    /// Number of live observers.
    pub fn len(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| entry.observer.strong_count() > 0)
            .count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.len() > 0
    }

    /// Deliver a newly appended item to every observer, in registration
    /// order.
    ///
    /// The first observer error ends the walk and is returned; observers
    /// after it do not see the item. The error reaches whoever fed the
    /// graph, which is expected to repair it with a rebuild.
    pub fn notify_add(&self, item: &T, index: Option<usize>) -> Result<(), StreamError> {
        for (id, observer) in self.snapshot() {
            if self.contains(id) {
                observer.on_add(item, index)?;
            }
        }
        Ok(())
    }

    /// Tell every observer to rebuild from `from`. Stops at the first
    /// error, like `notify_add`.
    pub fn notify_rebuild(&self, from: Timestamp) -> Result<(), StreamError> {
        for (id, observer) in self.snapshot() {
            if self.contains(id) {
                observer.on_rebuild(from)?;
            }
        }
        Ok(())
    }

    /// Tell every observer the entries at or before `to` were pruned.
    pub fn notify_prune(&self, to: Timestamp) -> Result<(), StreamError> {
        for (id, observer) in self.snapshot() {
            if self.contains(id) {
                observer.on_prune(to)?;
            }
        }
        Ok(())
    }

    /// Signal a fault to every observer.
    pub fn notify_error(&self, error: &StreamError) {
        for (id, observer) in self.snapshot() {
            if self.contains(id) {
                observer.on_error(error);
            }
        }
    }

    /// Complete every observer, then drop all registrations.
    pub fn end_transmission(&self) {
        let snapshot = self.snapshot();
        if !snapshot.is_empty() {
            warn!(observers = snapshot.len(), "Ending transmission");
        }
        for (id, observer) in snapshot {
            if self.contains(id) {
                observer.on_completed();
            }
        }
        self.entries.borrow_mut().clear();
    }

    /// Whether the registration `id` is still present.
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.entries.borrow().iter().any(|entry| entry.id == id)
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        let removed = {
            let mut entries = self.entries.borrow_mut();
            let before = entries.len();
            entries.retain(|entry| entry.id != id);
            before != entries.len()
        };
        if removed {
            debug!(subscription = %id, "Observer unsubscribed");
        }
        removed
    }

    fn snapshot(&self) -> Vec<(SubscriptionId, Rc<dyn StreamObserver<T>>)> {
        let mut entries = self.entries.borrow_mut();
        entries.retain(|entry| entry.observer.strong_count() > 0);
        entries
            .iter()
            .filter_map(|entry| entry.observer.upgrade().map(|observer| (entry.id, observer)))
            .collect()
    }
}

impl<T: 'static> Unsubscribe for SubscriptionRegistry<T> {
    fn release(&self, id: SubscriptionId) {
        let last = {
            let mut entries = self.entries.borrow_mut();
            match entries.iter_mut().find(|entry| entry.id == id) {
                Some(entry) => {
                    entry.handles = entry.handles.saturating_sub(1);
                    entry.handles == 0
                }
                None => false,
            }
        };
        if last {
            self.remove(id);
        }
    }

    fn contains(&self, id: SubscriptionId) -> bool {
        SubscriptionRegistry::contains(self, id)
    }
}
