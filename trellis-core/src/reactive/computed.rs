//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when read
//! after one of its dependencies changed.
//!
//! # How Computeds Work
//!
//! 1. On construction, the computed runs its function once and caches the
//!    result.
//!
//! 2. When accessed again, if no dependency has changed, the cached value is
//!    returned.
//!
//! 3. When a dependency changes, the computed is marked dirty and forwards a
//!    single notification to its own subscribers. Further dirty notifications
//!    are ignored until the next evaluation.
//!
//! 4. On next access, the computed drops its old dependencies, evaluates
//!    again while tracking new ones, and becomes clean.
//!
//! # Why This Matters
//!
//! Dirtiness is pushed eagerly but values are pulled lazily:
//!
//! - A signal changes
//! - 10 computeds depend on it, some through each other
//! - Each is marked dirty at most once per change
//! - Only the computeds actually read will recompute, and each at most once

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use super::context::ReactiveContext;
use super::readonly::ReadSignal;
use super::subscriber::{SourceList, Subscriber, SubscriberId, SubscriberKind, SubscriberSet, Subscription};
use crate::error::{BoxError, ReactiveError, Result};

/// Dirty state for a computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency changed (or the last evaluation failed). The next read
    /// re-evaluates. After a failure the next dependency change still
    /// notifies subscribers, so readers get a chance to retry.
    Dirty,
}

type ComputeFn<T> = Box<dyn Fn() -> std::result::Result<T, BoxError>>;

struct ComputedInner<T> {
    /// The subscriber ID used for dependency tracking.
    id: SubscriberId,

    /// The computation function.
    compute: ComputeFn<T>,

    /// The cached value (None if never computed successfully).
    value: RefCell<Option<T>>,

    /// Current dirty state.
    state: Cell<ComputedState>,

    /// Set while the function runs, to detect self reads.
    evaluating: Cell<bool>,

    /// Set when the last evaluation failed or panicked. A failed computed
    /// is dirty but has not forwarded that to its subscribers yet.
    failed: Cell<bool>,

    /// What this computed read during its last evaluation.
    sources: SourceList,

    /// Consumers that read this computed.
    subscribers: SubscriberSet,

    /// The mark-dirty subscriber installed while evaluating.
    consumer: Subscriber,
}

impl<T> ComputedInner<T> {
    fn mark_dirty(&self) {
        if self.state.get() == ComputedState::Dirty && !self.failed.get() {
            return;
        }
        self.failed.set(false);
        self.state.set(ComputedState::Dirty);
        tracing::trace!(computed = %self.id, "computed marked dirty");
        self.subscribers.notify();
    }

    fn refresh(&self) -> Result<()> {
        if self.state.get() == ComputedState::Clean {
            return Ok(());
        }
        if self.evaluating.get() {
            return Err(ReactiveError::CircularDependency(self.id));
        }

        // Dependencies may differ between runs.
        self.sources.release_all();

        self.failed.set(false);
        let result = {
            let _ctx = ReactiveContext::enter(self.consumer.clone(), self.sources.clone());
            let _evaluating = EvaluatingGuard::new(&self.evaluating, &self.failed);
            (self.compute)()
        };

        match result {
            Ok(value) => {
                *self.value.borrow_mut() = Some(value);
                self.failed.set(false);
                self.state.set(ComputedState::Clean);
                Ok(())
            }
            Err(source) => {
                self.failed.set(true);
                tracing::debug!(computed = %self.id, error = %source, "computed evaluation failed");
                Err(ReactiveError::Computation {
                    id: self.id,
                    source,
                })
            }
        }
    }
}

/// Clears the evaluating flag on every exit path, and records a panic
/// out of the function as a failed evaluation.
struct EvaluatingGuard<'a> {
    evaluating: &'a Cell<bool>,
    failed: &'a Cell<bool>,
}

impl<'a> EvaluatingGuard<'a> {
    fn new(evaluating: &'a Cell<bool>, failed: &'a Cell<bool>) -> Self {
        evaluating.set(true);
        Self { evaluating, failed }
    }
}

impl Drop for EvaluatingGuard<'_> {
    fn drop(&mut self) {
        self.evaluating.set(false);
        if std::thread::panicking() {
            self.failed.set(true);
        }
    }
}

/// A cached value derived from other reactive values.
///
/// Cloning yields another handle to the same computed.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::{Computed, Signal};
///
/// let count = Signal::new(2);
/// let doubled = Computed::new({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T>
where
    T: Clone + 'static,
{
    inner: Rc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + 'static,
{
    /// Create a new computed and evaluate it once.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let computed = Self::build(Box::new(move || Ok::<T, BoxError>(compute())));
        if let Err(err) = computed.inner.refresh() {
            // Only reachable through a self read during construction.
            tracing::error!(computed = %computed.inner.id, error = %err, "initial evaluation failed");
        }
        computed
    }

    /// Create a computed from a fallible function.
    ///
    /// Fails if the initial evaluation fails.
    pub fn try_new<F, E>(compute: F) -> Result<Self>
    where
        F: Fn() -> std::result::Result<T, E> + 'static,
        E: Into<BoxError>,
    {
        let computed = Self::build(Box::new(move || compute().map_err(Into::<BoxError>::into)));
        computed.inner.refresh()?;
        Ok(computed)
    }

    fn build(compute: ComputeFn<T>) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let id = SubscriberId::new();
            let weak = weak.clone();
            let consumer = Subscriber::with_id(id, SubscriberKind::Computed, move || {
                if let Some(inner) = weak.upgrade() {
                    inner.mark_dirty();
                }
            });

            ComputedInner {
                id,
                compute,
                value: RefCell::new(None),
                state: Cell::new(ComputedState::Dirty),
                evaluating: Cell::new(false),
                failed: Cell::new(false),
                sources: SourceList::new(),
                subscribers: SubscriberSet::new(),
                consumer,
            }
        });

        Self { inner }
    }

    /// Get the subscriber ID for this computed.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// Panics if the computation fails. Use [`Computed::try_get`] for
    /// computeds built with [`Computed::try_new`].
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// If called within a reactive context, the current computation starts
    /// depending on this computed. On failure the computed stays dirty and
    /// keeps its previous value.
    pub fn try_get(&self) -> Result<T> {
        ReactiveContext::track(&self.inner.subscribers);
        self.inner.refresh()?;
        self.cached()
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> Result<T> {
        self.inner.refresh()?;
        self.cached()
    }

    fn cached(&self) -> Result<T> {
        self.inner
            .value
            .borrow()
            .clone()
            .ok_or(ReactiveError::CircularDependency(self.inner.id))
    }

    /// Mark the computed dirty, as if a dependency had changed.
    pub fn mark_dirty(&self) {
        self.inner.mark_dirty();
    }

    /// Register a callback invoked whenever the computed becomes dirty.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + 'static,
    {
        self.inner.subscribers.subscribe(callback)
    }

    /// Get the current dirty state.
    pub fn state(&self) -> ComputedState {
        self.inner.state.get()
    }

    /// Number of data read during the last evaluation.
    pub fn dependency_count(&self) -> usize {
        self.inner.sources.len()
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// A read-only view of this computed.
    pub fn read_only(&self) -> ReadSignal<T> {
        ReadSignal::from_computed(self.clone())
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.sources.release_all();
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Create a computed.
pub fn computed<T, F>(compute: F) -> Computed<T>
where
    T: Clone + 'static,
    F: Fn() -> T + 'static,
{
    Computed::new(compute)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
