//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect re-runs (once the write's
//!    batch window closes).
//!
//! 3. Before re-running, the effect runs the cleanup returned by its previous
//!    run, drops its old dependencies and tracks new ones during execution.
//!
//! # Failure Handling
//!
//! Errors returned by the body, errors returned by a cleanup, and panics in
//! either are logged and swallowed. The writer that triggered the run never
//! sees them and the effect keeps responding to later changes.
//!
//! # Re-entrancy
//!
//! An effect that writes to something it reads would trigger itself. A run
//! requested while the effect is already running is ignored.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use super::context::ReactiveContext;
use super::runtime::{Reactive, Runtime};
use super::subscriber::{SourceList, Subscriber, SubscriberId, SubscriberKind};
use crate::error::{BoxError, ReactiveError};

/// Work to run before an effect's next run, or when it stops.
pub struct Cleanup(Box<dyn FnOnce() -> Result<(), BoxError>>);

impl Cleanup {
    /// Wrap an infallible cleanup.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self(Box::new(move || {
            f();
            Ok(())
        }))
    }

    /// Wrap a fallible cleanup. A returned error is logged.
    pub fn try_new<F, E>(f: F) -> Self
    where
        F: FnOnce() -> Result<(), E> + 'static,
        E: Into<BoxError>,
    {
        Self(Box::new(move || f().map_err(Into::<BoxError>::into)))
    }

    fn run(self, effect: SubscriberId) {
        let Cleanup(f) = self;
        let err = match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(())) => return,
            Ok(Err(source)) => ReactiveError::Cleanup(source),
            Err(payload) => ReactiveError::from_panic(payload),
        };
        tracing::error!(effect = %effect, error = %err, "effect cleanup failed");
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// Values an effect body may return.
pub trait EffectOutput {
    /// Split into an optional cleanup, or the error the body reported.
    fn into_cleanup(self) -> Result<Option<Cleanup>, BoxError>;
}

impl EffectOutput for () {
    fn into_cleanup(self) -> Result<Option<Cleanup>, BoxError> {
        Ok(None)
    }
}

impl EffectOutput for Cleanup {
    fn into_cleanup(self) -> Result<Option<Cleanup>, BoxError> {
        Ok(Some(self))
    }
}

impl EffectOutput for Option<Cleanup> {
    fn into_cleanup(self) -> Result<Option<Cleanup>, BoxError> {
        Ok(self)
    }
}

impl<O, E> EffectOutput for Result<O, E>
where
    O: EffectOutput,
    E: Into<BoxError>,
{
    fn into_cleanup(self) -> Result<Option<Cleanup>, BoxError> {
        self.map_err(Into::into).and_then(O::into_cleanup)
    }
}

type EffectFn = Box<dyn FnMut() -> Result<Option<Cleanup>, BoxError>>;

struct EffectInner {
    id: SubscriberId,
    run: RefCell<EffectFn>,
    cleanup: RefCell<Option<Cleanup>>,
    sources: SourceList,
    running: Cell<bool>,
    stopped: Cell<bool>,
    run_count: Cell<usize>,
    consumer: Subscriber,
}

impl EffectInner {
    fn execute(&self) {
        if self.stopped.get() || self.running.get() {
            return;
        }
        let _running = RunningGuard::new(&self.running);

        self.run_cleanup();
        self.sources.release_all();

        let outcome = {
            let _ctx = ReactiveContext::enter(self.consumer.clone(), self.sources.clone());
            panic::catch_unwind(AssertUnwindSafe(|| {
                let mut run = self.run.borrow_mut();
                (*run)()
            }))
        };
        self.run_count.set(self.run_count.get() + 1);
        tracing::trace!(effect = %self.id, dependencies = self.sources.len(), "effect ran");

        let cleanup = match outcome {
            Ok(Ok(cleanup)) => cleanup,
            Ok(Err(source)) => {
                let err = ReactiveError::Effect(source);
                tracing::error!(effect = %self.id, error = %err, "effect failed");
                None
            }
            Err(payload) => {
                let err = ReactiveError::from_panic(payload);
                tracing::error!(effect = %self.id, error = %err, "effect failed");
                None
            }
        };

        if self.stopped.get() {
            // Stopped from inside its own body.
            self.sources.release_all();
            if let Some(cleanup) = cleanup {
                cleanup.run(self.id);
            }
        } else {
            *self.cleanup.borrow_mut() = cleanup;
        }
    }

    fn run_cleanup(&self) {
        let cleanup = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup.run(self.id);
        }
    }

    fn stop(&self) {
        if self.stopped.replace(true) {
            return;
        }
        self.run_cleanup();
        self.sources.release_all();
        tracing::debug!(effect = %self.id, runs = self.run_count.get(), "effect stopped");
        Runtime::unregister(self.id);
    }
}

impl Reactive for EffectInner {
    fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    fn dispose(&self) {
        self.stop();
    }
}

/// Clears the running flag on every exit path.
struct RunningGuard<'a>(&'a Cell<bool>);

impl<'a> RunningGuard<'a> {
    fn new(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// The effect stays alive until [`Effect::stop`] is called, whether or not
/// the handle is kept.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use trellis_core::reactive::{Effect, Signal};
///
/// let count = Signal::new(0);
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let effect = Effect::new({
///     let count = count.clone();
///     let seen = seen.clone();
///     move || seen.borrow_mut().push(count.get())
/// });
///
/// count.set(5);
/// effect.stop();
/// count.set(6);
/// assert_eq!(*seen.borrow(), vec![0, 5]);
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies. It
    /// may return `()`, a [`Cleanup`], an `Option<Cleanup>`, or a `Result`
    /// of any of these.
    pub fn new<F, O>(mut run: F) -> Self
    where
        F: FnMut() -> O + 'static,
        O: EffectOutput,
    {
        let body: EffectFn = Box::new(move || run().into_cleanup());
        let inner = Rc::new_cyclic(|weak: &Weak<EffectInner>| {
            let id = SubscriberId::new();
            let weak = weak.clone();
            let consumer = Subscriber::with_id(id, SubscriberKind::Effect, move || {
                if let Some(inner) = weak.upgrade() {
                    inner.execute();
                }
            });

            EffectInner {
                id,
                run: RefCell::new(body),
                cleanup: RefCell::new(None),
                sources: SourceList::new(),
                running: Cell::new(false),
                stopped: Cell::new(false),
                run_count: Cell::new(0),
                consumer,
            }
        });

        Runtime::register(inner.clone());
        inner.execute();

        Self { inner }
    }

    /// Get the subscriber ID for this effect.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Run the effect now, as if a dependency had changed.
    pub fn run(&self) {
        self.inner.execute();
    }

    /// Stop the effect.
    ///
    /// Runs the pending cleanup, drops every dependency, and guarantees the
    /// body never runs again. Calling `stop` again does nothing.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Check if the effect has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.get()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner.sources.len()
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Create an effect.
pub fn effect<F, O>(run: F) -> Effect
where
    F: FnMut() -> O + 'static,
    O: EffectOutput,
{
    Effect::new(run)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
