//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (computed/effect), the
//!    signal registers that context as a subscriber.
//!
//! 2. When a write changes the value, all subscribers are notified. A write
//!    of the same value (see [`SameValue`]) is a no-op.
//!
//! 3. Computed subscribers are marked dirty; effect subscribers re-run once
//!    the write's batch window closes.
//!
//! # Memory Layout
//!
//! Each signal consists of:
//! - A unique ID (8 bytes)
//! - The value, behind a `RefCell`
//! - The comparison used to detect changes
//! - A set of subscribers (grows with number of dependents)

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::context::ReactiveContext;
use super::readonly::ReadSignal;
use super::same_value::SameValue;
use super::subscriber::{SubscriberSet, Subscription};

/// Counter for generating unique signal IDs.
static SIGNAL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique signal ID.
fn next_signal_id() -> u64 {
    SIGNAL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

struct SignalInner<T> {
    id: u64,
    value: RefCell<T>,
    equals: fn(&T, &T) -> bool,
    subscribers: SubscriberSet,
}

/// A reactive signal holding a value of type T.
///
/// Cloning a signal yields another handle to the same cell.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::Signal;
///
/// let count = Signal::new(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// count.update(|n| n + 1);
/// assert_eq!(count.get(), 6);
/// ```
pub struct Signal<T>
where
    T: Clone + 'static,
{
    inner: Rc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + SameValue + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self::with_equals(value, T::same_value)
    }
}

impl<T> Signal<T>
where
    T: Clone + 'static,
{
    /// Create a signal that uses `equals` to decide whether a write changes
    /// the value.
    pub fn with_equals(value: T, equals: fn(&T, &T) -> bool) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                id: next_signal_id(),
                value: RefCell::new(value),
                equals,
                subscribers: SubscriberSet::new(),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self) -> T {
        ReactiveContext::track(&self.inner.subscribers);
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value, tracking the read like [`Signal::get`].
    ///
    /// Writing to this signal from inside `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        ReactiveContext::track(&self.inner.subscribers);
        f(&self.inner.value.borrow())
    }

    /// Get the current value without tracking dependencies.
    ///
    /// Use this when you need to read the value without establishing
    /// a reactive dependency.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Set a new value and notify subscribers if it changed.
    ///
    /// Returns `true` if the value changed.
    pub fn set(&self, value: T) -> bool {
        {
            let mut current = self.inner.value.borrow_mut();
            if (self.inner.equals)(&current, &value) {
                return false;
            }
            *current = value;
        }

        tracing::trace!(signal = self.inner.id, "signal changed");
        self.inner.subscribers.notify();
        true
    }

    /// Update the value using a function of the previous value.
    ///
    /// This is useful for updates that depend on the current value.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.inner.value.borrow();
            f(&guard)
        };
        self.set(new_value)
    }

    /// Like [`Signal::update`] for a fallible `f`. Nothing is written if `f`
    /// fails.
    ///
    /// The previous value is read without tracking and `f` receives a copy,
    /// so `f` may read or write this signal.
    pub fn try_update<F, E>(&self, f: F) -> std::result::Result<bool, E>
    where
        F: FnOnce(T) -> std::result::Result<T, E>,
    {
        let new_value = f(self.get_untracked())?;
        Ok(self.set(new_value))
    }

    /// Register a callback invoked after every change.
    ///
    /// This bypasses dependency tracking entirely.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + 'static,
    {
        self.inner.subscribers.subscribe(callback)
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// A read-only view of this signal.
    pub fn read_only(&self) -> ReadSignal<T> {
        ReadSignal::from_signal(self.clone())
    }

    /// Check whether two handles refer to the same signal.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Create a signal.
pub fn signal<T>(value: T) -> Signal<T>
where
    T: Clone + SameValue + 'static,
{
    Signal::new(value)
}

/// Alias of [`signal`].
pub fn reference<T>(value: T) -> Signal<T>
where
    T: Clone + SameValue + 'static,
{
    Signal::new(value)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
