//! Read-only views.
//!
//! A read-only view exposes the reading half of a reactive value: reads
//! track exactly like reads of the underlying value, and external callbacks
//! can subscribe, but there is no write surface at all.

use std::fmt;

use super::computed::Computed;
use super::signal::Signal;
use super::subscriber::Subscription;
use crate::error::Result;
use crate::object::{Property, ReactiveObject, Value};

enum ReadSource<T>
where
    T: Clone + 'static,
{
    Signal(Signal<T>),
    Computed(Computed<T>),
}

impl<T> Clone for ReadSource<T>
where
    T: Clone + 'static,
{
    fn clone(&self) -> Self {
        match self {
            Self::Signal(signal) => Self::Signal(signal.clone()),
            Self::Computed(computed) => Self::Computed(computed.clone()),
        }
    }
}

/// A read-only handle to a signal or a computed.
pub struct ReadSignal<T>
where
    T: Clone + 'static,
{
    source: ReadSource<T>,
}

impl<T> ReadSignal<T>
where
    T: Clone + 'static,
{
    pub(crate) fn from_signal(signal: Signal<T>) -> Self {
        Self {
            source: ReadSource::Signal(signal),
        }
    }

    pub(crate) fn from_computed(computed: Computed<T>) -> Self {
        Self {
            source: ReadSource::Computed(computed),
        }
    }

    /// Get the current value, tracking the read.
    ///
    /// # Panics
    ///
    /// Panics if the view is over a computed whose evaluation fails. Use
    /// [`ReadSignal::try_get`] to handle the error.
    pub fn get(&self) -> T {
        match &self.source {
            ReadSource::Signal(signal) => signal.get(),
            ReadSource::Computed(computed) => computed.get(),
        }
    }

    /// Get the current value, tracking the read.
    pub fn try_get(&self) -> Result<T> {
        match &self.source {
            ReadSource::Signal(signal) => Ok(signal.get()),
            ReadSource::Computed(computed) => computed.try_get(),
        }
    }

    /// Get the current value without tracking.
    pub fn get_untracked(&self) -> Result<T> {
        match &self.source {
            ReadSource::Signal(signal) => Ok(signal.get_untracked()),
            ReadSource::Computed(computed) => computed.get_untracked(),
        }
    }

    /// Register a callback invoked after every change.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + 'static,
    {
        match &self.source {
            ReadSource::Signal(signal) => signal.subscribe(callback),
            ReadSource::Computed(computed) => computed.subscribe(callback),
        }
    }
}

impl<T> Clone for ReadSignal<T>
where
    T: Clone + 'static,
{
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
        }
    }
}

impl<T> fmt::Debug for ReadSignal<T>
where
    T: Clone + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.source {
            ReadSource::Signal(_) => "signal",
            ReadSource::Computed(_) => "computed",
        };
        f.debug_struct("ReadSignal").field("source", &kind).finish()
    }
}

/// A read-only view of a reactive object.
#[derive(Clone, Debug)]
pub struct ReadOnlyObject {
    inner: ReactiveObject,
}

impl ReadOnlyObject {
    pub(crate) fn new(inner: ReactiveObject) -> Self {
        Self { inner }
    }

    /// Read a property, tracking it. Nested objects are returned raw; use
    /// [`ReadOnlyObject::object`] to keep reading them reactively.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.get(key).map(Property::into_value)
    }

    /// Read a property holding a nested object as another read-only view.
    ///
    /// Returns `None` if the property is missing or does not hold a
    /// wrappable object.
    pub fn object(&self, key: &str) -> Option<ReadOnlyObject> {
        match self.inner.get(key)? {
            Property::Object(nested) => Some(nested.read_only()),
            Property::Value(_) => None,
        }
    }

    /// Check whether a property exists. Not tracked.
    pub fn has(&self, key: &str) -> bool {
        self.inner.has(key)
    }

    /// Property names in insertion order. Not tracked.
    pub fn keys(&self) -> Vec<String> {
        self.inner.keys()
    }

    /// Register a callback invoked after every change to `key`.
    pub fn subscribe<F>(&self, key: &str, callback: F) -> Subscription
    where
        F: Fn() + 'static,
    {
        self.inner.subscribe(key, callback)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;
    use crate::reactive::Effect;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn read_signal_follows_its_signal() {
        let signal = Signal::new(1);
        let view = signal.read_only();

        assert_eq!(view.get(), 1);
        signal.set(2);
        assert_eq!(view.get(), 2);
        assert_eq!(view.get_untracked().unwrap(), 2);
    }

    #[test]
    fn read_signal_over_computed_tracks() {
        let signal = Signal::new(3);
        let doubled = Computed::new({
            let signal = signal.clone();
            move || signal.get() * 2
        });
        let view = doubled.read_only();
        let runs = Rc::new(Cell::new(0));

        let effect = Effect::new({
            let view = view.clone();
            let runs = runs.clone();
            move || {
                view.get();
                runs.set(runs.get() + 1);
            }
        });

        signal.set(4);
        assert_eq!(runs.get(), 2);
        assert_eq!(view.try_get().unwrap(), 8);
        effect.stop();
    }

    #[test]
    fn read_signal_subscribe() {
        let signal = Signal::new(0);
        let calls = Rc::new(Cell::new(0));
        let subscription = signal.read_only().subscribe({
            let calls = calls.clone();
            move || calls.set(calls.get() + 1)
        });

        signal.set(1);
        subscription.unsubscribe();
        signal.set(2);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn read_only_object_reads_nested_views() {
        let inner = Object::new();
        inner.insert("x", 1.0);
        let outer = Object::new();
        outer.insert("inner", inner.clone());

        let state = ReactiveObject::new(&outer).unwrap();
        let view = state.read_only();

        assert!(view.has("inner"));
        assert_eq!(view.keys(), vec!["inner".to_string()]);

        let nested = view.object("inner").unwrap();
        assert_eq!(nested.get("x").and_then(|v| v.as_f64()), Some(1.0));
        assert!(view.object("missing").is_none());
    }
}
