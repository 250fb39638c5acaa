//! Subscriber types for the reactive system.
//!
//! A Subscriber represents anything that wants to hear about a change:
//! an effect that must re-run, a computed that must be marked dirty, or an
//! external callback registered through `subscribe`.
//!
//! Every reactive datum (signal, computed, object property) owns a
//! [`SubscriberSet`]. Consumers that read the datum while tracking are
//! inserted into it, and they keep a [`Dependency`] back-reference so they
//! can remove themselves before their next run.

use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::batch;
use super::context::untracked;
use crate::error::ReactiveError;

/// Unique identifier for a subscriber.
///
/// Each subscriber (computed, effect, or external callback) gets a unique
/// ID when created. Subscriber sets are keyed by this ID, which is what
/// makes "the same callback" collapse to a single entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a subscriber wants to be notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberKind {
    /// Re-run a side-effecting computation. Deferred while batching.
    Effect,

    /// Mark a derived value dirty. Always delivered immediately so a read
    /// later in the same batch sees the dirty flag.
    Computed,

    /// A callback registered through a public `subscribe` call.
    /// Deferred while batching.
    External,
}

/// A subscriber to reactive values.
///
/// Cloning is cheap and preserves identity: clones share the same ID and
/// the same callback.
#[derive(Clone)]
pub struct Subscriber {
    id: SubscriberId,
    kind: SubscriberKind,
    notify: Rc<dyn Fn()>,
}

impl Subscriber {
    /// Create a new subscriber with the given notification callback.
    pub fn new<F>(kind: SubscriberKind, notify: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self::with_id(SubscriberId::new(), kind, notify)
    }

    /// Create a subscriber that reuses an existing identity.
    pub fn with_id<F>(id: SubscriberId, kind: SubscriberKind, notify: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self {
            id,
            kind,
            notify: Rc::new(notify),
        }
    }

    /// Get the subscriber's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Get the subscriber's kind.
    pub fn kind(&self) -> SubscriberKind {
        self.kind
    }

    /// Invoke the callback directly, without any error guard.
    ///
    /// External callbacks run untracked: they never become dependencies of
    /// whichever consumer happened to trigger them.
    pub fn notify(&self) {
        match self.kind {
            SubscriberKind::External => untracked(|| (self.notify)()),
            SubscriberKind::Effect | SubscriberKind::Computed => (self.notify)(),
        }
    }

    /// Invoke the callback, catching and logging a panic.
    ///
    /// Returns `false` if the callback panicked.
    pub fn notify_guarded(&self) -> bool {
        match panic::catch_unwind(AssertUnwindSafe(|| self.notify())) {
            Ok(()) => true,
            Err(payload) => {
                let err = ReactiveError::from_panic(payload);
                tracing::error!(subscriber = %self.id, kind = ?self.kind, error = %err, "subscriber notification failed");
                false
            }
        }
    }

    /// Deliver a change notification according to the subscriber's kind.
    fn deliver(&self) {
        match self.kind {
            SubscriberKind::Computed => {
                self.notify_guarded();
            }
            SubscriberKind::Effect | SubscriberKind::External => {
                batch::schedule_notification(self.clone());
            }
        }
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

type Entries = IndexMap<SubscriberId, Subscriber>;

/// Insertion-ordered, duplicate-free set of subscribers.
///
/// Cloning yields another handle to the same set.
#[derive(Clone, Default)]
pub struct SubscriberSet {
    entries: Rc<RefCell<Entries>>,
}

impl SubscriberSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. Returns `true` if it was not already present.
    pub fn insert(&self, subscriber: Subscriber) -> bool {
        let mut entries = self.entries.borrow_mut();
        if entries.contains_key(&subscriber.id) {
            return false;
        }
        entries.insert(subscriber.id, subscriber);
        true
    }

    /// Remove a subscriber, preserving the order of the others.
    pub fn remove(&self, id: SubscriberId) -> bool {
        self.entries.borrow_mut().shift_remove(&id).is_some()
    }

    /// Check whether a subscriber is present.
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.entries.borrow().contains_key(&id)
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Copy the current members, in insertion order.
    pub fn snapshot(&self) -> SmallVec<[Subscriber; 4]> {
        self.entries.borrow().values().cloned().collect()
    }

    /// Notify every subscriber present right now.
    ///
    /// The pass iterates a snapshot, so subscribers added or removed during
    /// notification only affect later passes. The pass runs inside a batch
    /// window: computed subscribers are marked dirty immediately, effect and
    /// external subscribers run once the outermost batch closes.
    pub fn notify(&self) {
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            return;
        }
        batch::batch(|| {
            for subscriber in &snapshot {
                subscriber.deliver();
            }
        });
    }

    /// Register an external callback and return a handle that removes it.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + 'static,
    {
        let subscriber = Subscriber::new(SubscriberKind::External, callback);
        let id = subscriber.id();
        self.insert(subscriber);
        Subscription {
            dependency: Dependency::new(self, id),
        }
    }

    fn downgrade(&self) -> Weak<RefCell<Entries>> {
        Rc::downgrade(&self.entries)
    }
}

impl fmt::Debug for SubscriberSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.borrow().keys()).finish()
    }
}

/// A consumer's membership in one subscriber set.
///
/// Holds only a weak reference to the set, so a dependency never keeps the
/// datum it depends on alive.
#[derive(Clone)]
pub struct Dependency {
    set: Weak<RefCell<Entries>>,
    subscriber: SubscriberId,
}

impl Dependency {
    /// Record that `subscriber` is a member of `set`.
    pub fn new(set: &SubscriberSet, subscriber: SubscriberId) -> Self {
        Self {
            set: set.downgrade(),
            subscriber,
        }
    }

    /// Remove the subscriber from the set. No-op if the set is gone.
    pub fn release(&self) {
        if let Some(entries) = self.set.upgrade() {
            entries.borrow_mut().shift_remove(&self.subscriber);
        }
    }

    /// Whether the set this dependency points at still exists.
    pub fn is_live(&self) -> bool {
        self.set.strong_count() > 0
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("subscriber", &self.subscriber)
            .field("live", &self.is_live())
            .finish()
    }
}

/// The dependencies a consumer collected during its last run.
///
/// Shared between the consumer and the context entry that is active while
/// it runs, so dependencies recorded before a panic are never lost.
#[derive(Clone, Default)]
pub struct SourceList {
    sources: Rc<RefCell<SmallVec<[Dependency; 4]>>>,
}

impl SourceList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dependency.
    pub fn push(&self, dependency: Dependency) {
        self.sources.borrow_mut().push(dependency);
    }

    /// Unsubscribe from every recorded dependency and forget them.
    pub fn release_all(&self) {
        let sources = std::mem::take(&mut *self.sources.borrow_mut());
        for dependency in &sources {
            dependency.release();
        }
    }

    /// Number of recorded dependencies.
    pub fn len(&self) -> usize {
        self.sources.borrow().len()
    }

    /// Whether no dependency is recorded.
    pub fn is_empty(&self) -> bool {
        self.sources.borrow().is_empty()
    }
}

/// Handle returned by `subscribe`.
///
/// Dropping the handle leaves the callback registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug, Clone)]
pub struct Subscription {
    dependency: Dependency,
}

impl Subscription {
    /// Remove the callback. Calling this more than once is harmless.
    pub fn unsubscribe(&self) {
        self.dependency.release();
    }
}
