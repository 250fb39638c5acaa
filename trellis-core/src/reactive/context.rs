//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When entering a reactive context (e.g., running a computed or effect), we
//! push the consumer onto the stack. When the returned guard drops, it is
//! popped again, which restores the previous consumer on every exit path,
//! unwinding included.
//!
//! Attribution is always to the innermost entry. A computed evaluated inside
//! an effect collects its own dependencies; the effect depends on the
//! computed, not on what the computed read.
//!
//! Each thread has its own stack, so independent graphs on different
//! threads (one per test, for instance) never observe each other.

use std::cell::RefCell;

use super::subscriber::{Dependency, SourceList, Subscriber, SubscriberId, SubscriberKind, SubscriberSet};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Option<ContextEntry>>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
///
/// Contains information about the currently executing computation.
#[derive(Clone)]
struct ContextEntry {
    /// The consumer to register with every datum read.
    consumer: Subscriber,
    /// Where the consumer keeps the dependencies it collects.
    sources: SourceList,
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation panics.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given consumer.
    ///
    /// While this context is active, any datum that is read registers the
    /// consumer as a subscriber and records the dependency in `sources`.
    ///
    /// The context is automatically exited when the returned guard is dropped.
    pub fn enter(consumer: Subscriber, sources: SourceList) -> Self {
        let subscriber_id = Some(consumer.id());
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow_mut()
                .push(Some(ContextEntry { consumer, sources }));
        });

        Self { subscriber_id }
    }

    /// Enter a context in which reads are not tracked at all.
    pub fn enter_untracked() -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(None));
        Self { subscriber_id: None }
    }

    /// Check if there is an active tracking consumer.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }

    /// Get the current consumer's subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        Self::current().map(|entry| entry.consumer.id())
    }

    /// The active consumer, if it is an effect.
    pub fn current_effect() -> Option<Subscriber> {
        Self::current_of_kind(SubscriberKind::Effect)
    }

    /// The active consumer, if it is a computed.
    pub fn current_computed() -> Option<Subscriber> {
        Self::current_of_kind(SubscriberKind::Computed)
    }

    /// Register the active consumer with `subscribers`.
    ///
    /// This is called by every reactive datum when it is read. The
    /// dependency is recorded only the first time the consumer joins the set.
    pub fn track(subscribers: &SubscriberSet) {
        let Some(entry) = Self::current() else {
            return;
        };

        let id = entry.consumer.id();
        if subscribers.insert(entry.consumer) {
            entry.sources.push(Dependency::new(subscribers, id));
        }
    }

    /// Depth of the context stack, untracked entries included.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }

    fn current() -> Option<ContextEntry> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    fn current_of_kind(kind: SubscriberKind) -> Option<Subscriber> {
        Self::current()
            .map(|entry| entry.consumer)
            .filter(|consumer| consumer.kind() == kind)
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Verify we're popping the right context.
            // This helps catch bugs where contexts are mismatched.
            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.as_ref().map(|e| e.consumer.id()),
                    self.subscriber_id,
                    "ReactiveContext mismatch"
                );
            }
        });
    }
}

/// Run `f` without tracking any reads it performs.
pub fn untracked<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let _ctx = ReactiveContext::enter_untracked();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consumer(kind: SubscriberKind) -> Subscriber {
        Subscriber::new(kind, || {})
    }

    #[test]
    fn context_tracks_subscriber() {
        let effect = consumer(SubscriberKind::Effect);
        let id = effect.id();

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(effect, SourceList::new());

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_subscriber(), Some(id));
            assert!(ReactiveContext::current_effect().is_some());
            assert!(ReactiveContext::current_computed().is_none());
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn context_records_dependencies_once() {
        let sources = SourceList::new();
        let set = SubscriberSet::new();
        let _ctx = ReactiveContext::enter(consumer(SubscriberKind::Computed), sources.clone());

        ReactiveContext::track(&set);
        ReactiveContext::track(&set);

        assert_eq!(set.len(), 1);
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn nested_contexts() {
        let outer = consumer(SubscriberKind::Effect);
        let inner = consumer(SubscriberKind::Computed);
        let (outer_id, inner_id) = (outer.id(), inner.id());

        {
            let _ctx1 = ReactiveContext::enter(outer, SourceList::new());
            assert_eq!(ReactiveContext::current_subscriber(), Some(outer_id));

            {
                let _ctx2 = ReactiveContext::enter(inner, SourceList::new());
                assert_eq!(ReactiveContext::current_subscriber(), Some(inner_id));
                assert!(ReactiveContext::current_effect().is_none());
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current_subscriber(), Some(outer_id));
        }

        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn untracked_suppresses_registration() {
        let set = SubscriberSet::new();
        let _ctx = ReactiveContext::enter(consumer(SubscriberKind::Effect), SourceList::new());

        untracked(|| {
            assert!(!ReactiveContext::is_active());
            ReactiveContext::track(&set);
        });

        assert!(set.is_empty());
        assert!(ReactiveContext::is_active());
    }

    #[test]
    fn context_is_restored_after_panic() {
        let depth = ReactiveContext::depth();

        let result = std::panic::catch_unwind(|| {
            let _ctx = ReactiveContext::enter(consumer(SubscriberKind::Effect), SourceList::new());
            panic!("computation failed");
        });

        assert!(result.is_err());
        assert_eq!(ReactiveContext::depth(), depth);
    }
}
