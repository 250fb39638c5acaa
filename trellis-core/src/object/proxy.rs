//! Per-property reactivity for plain objects.
//!
//! A [`ReactiveObject`] is an explicit reactive container over an
//! [`Object`]: reads go through [`ReactiveObject::get`] and are tracked per
//! key, writes go through [`ReactiveObject::set`] and
//! [`ReactiveObject::delete`] and notify only the readers of the key they
//! touch.
//!
//! # How Wrapping Works
//!
//! 1. Wrapping looks the object up in a per-thread cache keyed by
//!    `(ObjectId, WrapMode)`. Each entry holds the per-property subscriber
//!    sets, so wrapping the same object twice yields the same wrapper
//!    identity and the same subscribers.
//!
//! 2. A read in deep mode that lands on a nested plain object wraps that
//!    object on demand. Nothing is wrapped eagerly.
//!
//! 3. The cache does not keep objects alive. When an object is dropped its
//!    entries are removed from the cache.
//!
//! Lists, dates, patterns, maps and sets are never wrapped; they come back
//! as plain [`Value`]s. Objects marked raw are never wrapped either.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::value::{Object, ObjectId, Value};
use crate::error::{ReactiveError, Result};
use crate::reactive::{ReactiveContext, ReadOnlyObject, SameValue, Signal, SubscriberSet, Subscription};

/// How far reactivity reaches into nested objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapMode {
    /// Nested plain objects are wrapped when read.
    Deep,
    /// Only the top-level properties are reactive.
    Shallow,
}

struct WrapperState {
    mode: WrapMode,
    properties: RefCell<IndexMap<String, SubscriberSet>>,
}

impl WrapperState {
    fn new(mode: WrapMode) -> Self {
        Self {
            mode,
            properties: RefCell::new(IndexMap::new()),
        }
    }

    /// The subscriber set for `key`, created on first use.
    fn property(&self, key: &str) -> SubscriberSet {
        if let Some(set) = self.properties.borrow().get(key) {
            return set.clone();
        }
        self.properties
            .borrow_mut()
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    fn existing(&self, key: &str) -> Option<SubscriberSet> {
        self.properties.borrow().get(key).cloned()
    }
}

thread_local! {
    static WRAPPERS: RefCell<HashMap<(ObjectId, WrapMode), Rc<WrapperState>>> =
        RefCell::new(HashMap::new());
}

/// Forget every wrapper of a dropped object.
pub(crate) fn invalidate(id: ObjectId) {
    // Removed states are dropped after the borrow ends: their subscribers
    // may own objects whose drop lands back here.
    let removed = WRAPPERS.try_with(|wrappers| {
        let Ok(mut wrappers) = wrappers.try_borrow_mut() else {
            return Vec::new();
        };
        [WrapMode::Deep, WrapMode::Shallow]
            .into_iter()
            .filter_map(|mode| wrappers.remove(&(id, mode)))
            .collect::<Vec<_>>()
    });
    if let Ok(removed) = removed {
        if !removed.is_empty() {
            tracing::debug!(object = %id, "wrapper cache entry invalidated");
        }
    }
}

/// Number of cached wrappers on this thread.
pub fn cached_wrapper_count() -> usize {
    WRAPPERS.with(|wrappers| wrappers.borrow().len())
}

/// A property read through a [`ReactiveObject`].
#[derive(Clone, Debug)]
pub enum Property {
    /// A nested plain object, wrapped (deep mode only).
    Object(ReactiveObject),
    /// Any other value, as stored.
    Value(Value),
}

impl Property {
    /// The stored value. A wrapped object is returned raw.
    pub fn into_value(self) -> Value {
        match self {
            Property::Object(object) => Value::Object(object.to_raw()),
            Property::Value(value) => value,
        }
    }

    /// The nested reactive object, if this property holds one.
    pub fn as_object(&self) -> Option<&ReactiveObject> {
        match self {
            Property::Object(object) => Some(object),
            Property::Value(_) => None,
        }
    }

    /// The stored number, if this property holds one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Property::Value(value) => value.as_f64(),
            Property::Object(_) => None,
        }
    }

    /// The stored string, if this property holds one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Property::Value(value) => value.as_str(),
            Property::Object(_) => None,
        }
    }
}

/// A plain object with per-property dependency tracking.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use trellis_core::object::{Object, ReactiveObject};
/// use trellis_core::reactive::Effect;
///
/// let state = ReactiveObject::new(&Object::from_fields([("a", 1), ("b", 2)])).unwrap();
/// let runs = Rc::new(Cell::new(0));
///
/// let effect = Effect::new({
///     let state = state.clone();
///     let runs = runs.clone();
///     move || {
///         state.get("a");
///         runs.set(runs.get() + 1);
///     }
/// });
///
/// state.set("b", 99);
/// assert_eq!(runs.get(), 1);
///
/// state.set("a", 5);
/// assert_eq!(runs.get(), 2);
/// effect.stop();
/// ```
#[derive(Clone)]
pub struct ReactiveObject {
    object: Object,
    state: Rc<WrapperState>,
}

impl ReactiveObject {
    /// Wrap an object with deep reactivity.
    ///
    /// Fails if the object is marked raw.
    pub fn new(object: &Object) -> Result<Self> {
        Self::with_mode(object, WrapMode::Deep)
    }

    /// Wrap an object with top-level reactivity only.
    pub fn shallow(object: &Object) -> Result<Self> {
        Self::with_mode(object, WrapMode::Shallow)
    }

    /// Wrap a value holding a plain object.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Object(object) => Self::new(object),
            _ => Err(ReactiveError::NotAnObject),
        }
    }

    /// Wrap an object in the given mode.
    pub fn with_mode(object: &Object, mode: WrapMode) -> Result<Self> {
        if object.is_raw() {
            return Err(ReactiveError::RawObject(object.id()));
        }
        Ok(Self::wrap(object, mode))
    }

    fn wrap(object: &Object, mode: WrapMode) -> Self {
        let state = WRAPPERS.with(|wrappers| {
            wrappers
                .borrow_mut()
                .entry((object.id(), mode))
                .or_insert_with(|| {
                    tracing::trace!(object = %object.id(), ?mode, "wrapper created");
                    Rc::new(WrapperState::new(mode))
                })
                .clone()
        });
        Self {
            object: object.clone(),
            state,
        }
    }

    /// The wrapping mode.
    pub fn mode(&self) -> WrapMode {
        self.state.mode
    }

    /// The underlying object's identity.
    pub fn id(&self) -> ObjectId {
        self.object.id()
    }

    /// Read a property, tracking it.
    ///
    /// Reading a missing key is tracked too, so a later write that creates
    /// the key notifies this reader.
    pub fn get(&self, key: &str) -> Option<Property> {
        ReactiveContext::track(&self.state.property(key));
        let value = self.object.get(key)?;
        Some(self.lift(value))
    }

    fn lift(&self, value: Value) -> Property {
        match &value {
            Value::Object(nested) if self.state.mode == WrapMode::Deep && value.is_wrappable() => {
                Property::Object(Self::wrap(nested, WrapMode::Deep))
            }
            _ => Property::Value(value),
        }
    }

    /// Write a property and notify its readers if the value changed.
    ///
    /// Returns `true` if the value changed.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        if let Some(current) = self.object.get(key) {
            if current.same_value(&value) {
                return false;
            }
        }
        self.object.insert(key, value);
        tracing::trace!(object = %self.object.id(), key, "property changed");
        self.notify(key);
        true
    }

    /// Delete a property and notify its readers if it existed.
    ///
    /// Returns `true` if the property existed.
    pub fn delete(&self, key: &str) -> bool {
        if self.object.remove(key).is_none() {
            return false;
        }
        tracing::trace!(object = %self.object.id(), key, "property deleted");
        self.notify(key);
        true
    }

    fn notify(&self, key: &str) {
        if let Some(subscribers) = self.state.existing(key) {
            subscribers.notify();
        }
    }

    /// Check whether a property exists. Not tracked.
    pub fn has(&self, key: &str) -> bool {
        self.object.contains_key(key)
    }

    /// Property names in insertion order. Not tracked.
    pub fn keys(&self) -> Vec<String> {
        self.object.keys()
    }

    /// Number of properties. Not tracked.
    pub fn len(&self) -> usize {
        self.object.len()
    }

    /// Whether the object has no properties. Not tracked.
    pub fn is_empty(&self) -> bool {
        self.object.is_empty()
    }

    /// The underlying plain object.
    pub fn to_raw(&self) -> Object {
        self.object.clone()
    }

    /// Register a callback invoked after every change to `key`.
    pub fn subscribe<F>(&self, key: &str, callback: F) -> Subscription
    where
        F: Fn() + 'static,
    {
        self.state.property(key).subscribe(callback)
    }

    /// Number of subscribers to `key`.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.state.existing(key).map_or(0, |set| set.len())
    }

    /// Check whether two wrappers share the same identity.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// A read-only view of this object.
    pub fn read_only(&self) -> ReadOnlyObject {
        ReadOnlyObject::new(self.clone())
    }
}

impl SameValue for ReactiveObject {
    fn same_value(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl From<ReactiveObject> for Value {
    fn from(object: ReactiveObject) -> Self {
        Value::Object(object.to_raw())
    }
}

impl fmt::Debug for ReactiveObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveObject")
            .field("object", &self.object)
            .field("mode", &self.state.mode)
            .finish()
    }
}

/// A value made reactive by [`reactive`].
#[derive(Clone, Debug)]
pub enum ReactiveValue {
    /// A plain object, reactive per property.
    Object(ReactiveObject),
    /// Anything else, held in a signal.
    Value(Signal<Value>),
}

impl ReactiveValue {
    /// The reactive object, if the value was a plain object.
    pub fn as_object(&self) -> Option<&ReactiveObject> {
        match self {
            ReactiveValue::Object(object) => Some(object),
            ReactiveValue::Value(_) => None,
        }
    }

    /// The signal, if the value was not a plain object.
    pub fn as_signal(&self) -> Option<&Signal<Value>> {
        match self {
            ReactiveValue::Value(signal) => Some(signal),
            ReactiveValue::Object(_) => None,
        }
    }
}

/// Make any value reactive.
///
/// Plain objects become a deep [`ReactiveObject`]; everything else,
/// including objects marked raw, is held in a [`Signal`].
pub fn reactive(value: impl Into<Value>) -> ReactiveValue {
    let value = value.into();
    match &value {
        Value::Object(object) if value.is_wrappable() => {
            ReactiveValue::Object(ReactiveObject::wrap(object, WrapMode::Deep))
        }
        _ => ReactiveValue::Value(Signal::new(value)),
    }
}

/// Make a plain object reactive at the top level only.
pub fn shallow_reactive(object: &Object) -> Result<ReactiveObject> {
    ReactiveObject::shallow(object)
}

/// The plain value behind a reactive value. Not tracked.
pub fn to_raw(value: &ReactiveValue) -> Value {
    match value {
        ReactiveValue::Object(object) => Value::Object(object.to_raw()),
        ReactiveValue::Value(signal) => signal.get_untracked(),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
