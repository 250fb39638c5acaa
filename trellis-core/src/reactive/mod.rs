//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computed
//! values, and effects. These primitives form the foundation of Trellis's
//! fine-grained reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a computed or effect), the signal
//! registers that context as a dependent. When the signal's value changes,
//! all dependents are notified.
//!
//! ## Computed Values
//!
//! A Computed is a derived value that caches its result. A change upstream
//! only marks it dirty; it re-evaluates lazily on the next read. Dirtiness
//! saturates, so a diamond-shaped graph evaluates each node once per change.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change, and may return a cleanup to run before its next run.
//!
//! ## Batching
//!
//! Every write notifies inside a batch window: dirty flags propagate first,
//! effects run once the outermost window closes. [`batch`] widens the window
//! to cover several writes.
//!
//! # Implementation Notes
//!
//! Dependencies are detected through a thread-local tracking context. When
//! a signal is read, the innermost active consumer is registered as a
//! dependent and the dependency is recorded on the consumer, so it can drop
//! its old dependencies before each re-run.

mod batch;
mod computed;
mod context;
mod effect;
mod readonly;
mod runtime;
mod same_value;
mod signal;
mod subscriber;
mod watch;

pub use batch::{batch, is_batching, pending_count, schedule_notification};
pub use computed::{computed, Computed, ComputedState};
pub use context::{untracked, ReactiveContext};
pub use effect::{effect, Cleanup, Effect, EffectOutput};
pub use readonly::{ReadOnlyObject, ReadSignal};
pub use runtime::{Reactive, Runtime};
pub use same_value::SameValue;
pub use signal::{reference, signal, Signal};
pub use subscriber::{
    Dependency, SourceList, Subscriber, SubscriberId, SubscriberKind, SubscriberSet, Subscription,
};
pub use watch::{watch, watch_multiple, watch_property, WatchOptions};
