//! Reactive Runtime
//!
//! The runtime keeps live effects alive. An effect must keep responding to
//! its dependencies after the caller drops its handle, so every running
//! effect is registered here and only leaves the registry when it is
//! stopped.
//!
//! # How It Works
//!
//! 1. When an effect is created, it registers with the runtime.
//!
//! 2. Signals hold the effect's subscriber, which refers back to the effect
//!    weakly; the registry entry is the strong reference.
//!
//! 3. Stopping the effect unregisters it. Once nothing else holds it, the
//!    effect is dropped.
//!
//! # Thread Safety
//!
//! The registry is thread-local, matching the tracking context. Reactive
//! values are single-threaded (`!Send`), so a graph never spans threads.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use super::context::ReactiveContext;
use super::subscriber::SubscriberId;

/// A reactive computation the runtime keeps alive.
pub trait Reactive {
    /// Get the subscriber ID for this reactive value.
    fn subscriber_id(&self) -> SubscriberId;

    /// Stop the computation for good.
    fn dispose(&self);
}

thread_local! {
    static REGISTRY: RefCell<IndexMap<SubscriberId, Rc<dyn Reactive>>> = RefCell::new(IndexMap::new());
}

/// The per-thread reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Register a reactive value with the runtime.
    pub fn register(reactive: Rc<dyn Reactive>) {
        let id = reactive.subscriber_id();
        REGISTRY.with(|registry| {
            registry.borrow_mut().insert(id, reactive);
        });
    }

    /// Unregister a reactive value. Returns `true` if it was registered.
    pub fn unregister(id: SubscriberId) -> bool {
        // Drop the entry outside the borrow: dropping an effect may run
        // arbitrary destructors that touch the registry.
        let removed = REGISTRY.with(|registry| registry.borrow_mut().shift_remove(&id));
        removed.is_some()
    }

    /// Check whether a reactive value is registered.
    pub fn is_registered(id: SubscriberId) -> bool {
        REGISTRY.with(|registry| registry.borrow().contains_key(&id))
    }

    /// Number of live effects on this thread.
    pub fn effect_count() -> usize {
        REGISTRY.with(|registry| registry.borrow().len())
    }

    /// Stop every live effect on this thread.
    pub fn dispose_all() {
        let live: Vec<_> = REGISTRY.with(|registry| registry.borrow().values().cloned().collect());
        tracing::debug!(count = live.len(), "disposing all effects");
        for reactive in live {
            reactive.dispose();
        }
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a reactive context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }
}
