//! The plain object model.
//!
//! [`Value`] is a small dynamic value type: scalars, plain keyed objects,
//! and a handful of opaque containers. Plain [`Object`]s can be made
//! reactive per property (see [`ReactiveObject`](super::ReactiveObject));
//! the opaque containers never are. They are shared handles compared by
//! reference, so mutating one in place is invisible to the reactive graph
//! while storing a different container is a change.
//!
//! # Identity
//!
//! Scalars compare by value with the usual identity rules for numbers
//! (NaN is NaN, `+0` is not `-0`). Strings compare by contents. Every
//! container compares by reference.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use super::proxy;
use crate::reactive::SameValue;

/// Stable identity of an [`Object`], used to key the wrapper cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

struct ObjectData {
    id: ObjectId,
    fields: RefCell<IndexMap<String, Value>>,
    raw: Cell<bool>,
}

impl Drop for ObjectData {
    fn drop(&mut self) {
        proxy::invalidate(self.id);
    }
}

/// A shared plain keyed object.
///
/// Cloning yields another handle to the same object. Field order is
/// insertion order. Writes through this handle bypass reactivity; go
/// through a [`ReactiveObject`](super::ReactiveObject) to notify readers.
#[derive(Clone)]
pub struct Object(Rc<ObjectData>);

impl Object {
    /// Create an empty object.
    pub fn new() -> Self {
        Self(Rc::new(ObjectData {
            id: ObjectId::next(),
            fields: RefCell::new(IndexMap::new()),
            raw: Cell::new(false),
        }))
    }

    /// Create an object from key/value pairs.
    pub fn from_fields<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let object = Self::new();
        {
            let mut map = object.0.fields.borrow_mut();
            for (key, value) in fields {
                map.insert(key.into(), value.into());
            }
        }
        object
    }

    /// The object's identity.
    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    /// Get a field's value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.fields.borrow().get(key).cloned()
    }

    /// Set a field, returning the previous value.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.fields.borrow_mut().insert(key.into(), value.into())
    }

    /// Remove a field, returning its value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.fields.borrow_mut().shift_remove(key)
    }

    /// Check whether a field exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.fields.borrow().contains_key(key)
    }

    /// Field names in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.0.fields.borrow().keys().cloned().collect()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.fields.borrow().len()
    }

    /// Whether the object has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.fields.borrow().is_empty()
    }

    /// Permanently exclude this object from reactivity.
    pub fn mark_raw(&self) -> Self {
        self.0.raw.set(true);
        self.clone()
    }

    /// Whether [`Object::mark_raw`] was called.
    pub fn is_raw(&self) -> bool {
        self.0.raw.get()
    }

    /// Check whether two handles refer to the same object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Object {
    // Fields are not printed: objects may reference themselves.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.0.id)
            .field("keys", &self.keys())
            .field("raw", &self.is_raw())
            .finish()
    }
}

impl SameValue for Object {
    fn same_value(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

/// An ordered sequence. Opaque to reactivity.
#[derive(Clone, Default)]
pub struct List(Rc<RefCell<Vec<Value>>>);

impl List {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value in place.
    pub fn push(&self, value: impl Into<Value>) {
        self.0.borrow_mut().push(value.into());
    }

    /// Get an element.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().get(index).cloned()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Copy the elements out.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }
}

impl FromIterator<Value> for List {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(Rc::new(RefCell::new(iter.into_iter().collect())))
    }
}

/// A point in time, in milliseconds since the Unix epoch. Opaque to
/// reactivity.
#[derive(Clone)]
pub struct Date(Rc<Cell<i64>>);

impl Date {
    /// Create a date from epoch milliseconds.
    pub fn from_millis(millis: i64) -> Self {
        Self(Rc::new(Cell::new(millis)))
    }

    /// Epoch milliseconds.
    pub fn millis(&self) -> i64 {
        self.0.get()
    }

    /// Move the date in place.
    pub fn set_millis(&self, millis: i64) {
        self.0.set(millis);
    }
}

/// A pattern, kept as its source text. Opaque to reactivity.
#[derive(Clone)]
pub struct Pattern(Rc<str>);

impl Pattern {
    /// Create a pattern from its source text.
    pub fn new(source: &str) -> Self {
        Self(Rc::from(source))
    }

    /// The pattern's source text.
    pub fn source(&self) -> &str {
        &self.0
    }
}

/// A keyed container with its own mutation methods. Opaque to reactivity.
#[derive(Clone, Default)]
pub struct MapValue(Rc<RefCell<IndexMap<String, Value>>>);

impl MapValue {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert in place, returning the previous value.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.borrow_mut().insert(key.into(), value.into())
    }

    /// Get an entry.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.borrow().get(key).cloned()
    }

    /// Remove an entry in place.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.borrow_mut().shift_remove(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

/// A duplicate-free collection with its own mutation methods. Opaque to
/// reactivity. Membership uses [`SameValue`].
#[derive(Clone, Default)]
pub struct SetValue(Rc<RefCell<Vec<Value>>>);

impl SetValue {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value in place. Returns `false` if it was already present.
    pub fn add(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        let mut items = self.0.borrow_mut();
        if items.iter().any(|item| item.same_value(&value)) {
            return false;
        }
        items.push(value);
        true
    }

    /// Check membership.
    pub fn contains(&self, value: &Value) -> bool {
        self.0.borrow().iter().any(|item| item.same_value(value))
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

macro_rules! opaque_debug {
    ($($ty:ident),*) => {
        $(
            impl fmt::Debug for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, concat!(stringify!($ty), "@{:p}"), Rc::as_ptr(&self.0))
                }
            }
        )*
    };
}

opaque_debug!(List, Date, MapValue, SetValue);

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.source())
    }
}

/// A dynamic value stored in an [`Object`].
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(Object),
    List(List),
    Date(Date),
    Pattern(Pattern),
    Map(MapValue),
    Set(SetValue),
}

impl Value {
    /// Whether this value may be wrapped for per-property reactivity:
    /// a plain object that is not marked raw.
    pub fn is_wrappable(&self) -> bool {
        matches!(self, Value::Object(object) if !object.is_raw())
    }

    /// Short name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::List(_) => "list",
            Value::Date(_) => "date",
            Value::Pattern(_) => "pattern",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    /// Convert to JSON. Non-finite numbers become `null`, dates become
    /// epoch milliseconds and patterns their source text.
    ///
    /// Fails on a container that contains itself, directly or through
    /// other containers.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

impl SameValue for Value {
    fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a.same_value(b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(&a.0, &b.0),
            (Value::Date(a), Value::Date(b)) => Rc::ptr_eq(&a.0, &b.0),
            (Value::Pattern(a), Value::Pattern(b)) => Rc::ptr_eq(&a.0, &b.0),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(&a.0, &b.0),
            (Value::Set(a), Value::Set(b)) => Rc::ptr_eq(&a.0, &b.0),
            _ => false,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl From<List> for Value {
    fn from(list: List) -> Self {
        Value::List(list)
    }
}

impl From<Date> for Value {
    fn from(date: Date) -> Self {
        Value::Date(date)
    }
}

impl From<Pattern> for Value {
    fn from(pattern: Pattern) -> Self {
        Value::Pattern(pattern)
    }
}

impl From<MapValue> for Value {
    fn from(map: MapValue) -> Self {
        Value::Map(map)
    }
}

impl From<SetValue> for Value {
    fn from(set: SetValue) -> Self {
        Value::Set(set)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(fields) => Value::Object(Object::from_fields(fields)),
        }
    }
}

thread_local! {
    /// Containers currently being serialized on this thread.
    static SERIALIZING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks a container as being serialized until dropped.
struct CycleGuard(usize);

impl CycleGuard {
    fn enter<T, E: serde::ser::Error>(container: *const T) -> Result<Self, E> {
        let address = container as *const () as usize;
        SERIALIZING.with(|active| {
            let mut active = active.borrow_mut();
            if active.contains(&address) {
                return Err(E::custom("cyclic object"));
            }
            active.push(address);
            Ok(Self(address))
        })
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        SERIALIZING.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(index) = active.iter().rposition(|&address| address == self.0) {
                active.remove(index);
            }
        });
    }
}

impl Serialize for Object {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let _guard = CycleGuard::enter::<_, S::Error>(Rc::as_ptr(&self.0))?;
        let fields = self.0.fields.borrow();
        let mut map = serializer.serialize_map(Some(fields.len()))?;
        for (key, value) in fields.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Object(object) => object.serialize(serializer),
            Value::List(list) => {
                let _guard = CycleGuard::enter::<_, S::Error>(Rc::as_ptr(&list.0))?;
                let items = list.0.borrow();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Date(date) => serializer.serialize_i64(date.millis()),
            Value::Pattern(pattern) => serializer.serialize_str(pattern.source()),
            Value::Map(map) => {
                let _guard = CycleGuard::enter::<_, S::Error>(Rc::as_ptr(&map.0))?;
                let entries = map.0.borrow();
                let mut out = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries.iter() {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
            Value::Set(set) => {
                let _guard = CycleGuard::enter::<_, S::Error>(Rc::as_ptr(&set.0))?;
                let items = set.0.borrow();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_round_trip_keeps_field_order() {
        let value = Value::from(json!({"b": 1, "a": [true, null], "c": {"d": "x"}}));
        let object = value.as_object().unwrap();

        assert_eq!(object.keys(), vec!["b", "a", "c"]);
        assert!(matches!(object.get("a"), Some(Value::List(_))));
        assert_eq!(
            value.to_json().unwrap(),
            json!({"b": 1.0, "a": [true, null], "c": {"d": "x"}})
        );
    }

    #[test]
    fn identity_rules() {
        assert!(Value::Number(f64::NAN).same_value(&Value::Number(f64::NAN)));
        assert!(!Value::Number(0.0).same_value(&Value::Number(-0.0)));
        assert!(Value::from("a").same_value(&Value::from("a")));
        assert!(!Value::from(1).same_value(&Value::from("1")));

        let a = Object::from_fields([("x", 1)]);
        let b = Object::from_fields([("x", 1)]);
        assert!(Value::from(a.clone()).same_value(&Value::from(a.clone())));
        assert!(!Value::from(a).same_value(&Value::from(b)));

        let list = List::new();
        assert!(Value::from(list.clone()).same_value(&Value::from(list.clone())));
        assert!(!Value::from(list).same_value(&Value::from(List::new())));
    }

    #[test]
    fn only_plain_unraw_objects_are_wrappable() {
        let object = Object::new();
        assert!(Value::from(object.clone()).is_wrappable());
        assert!(!Value::from(List::new()).is_wrappable());
        assert!(!Value::from(Date::from_millis(0)).is_wrappable());
        assert!(!Value::from(Pattern::new("a+")).is_wrappable());
        assert!(!Value::from(MapValue::new()).is_wrappable());
        assert!(!Value::from(SetValue::new()).is_wrappable());
        assert!(!Value::from(1.5).is_wrappable());

        object.mark_raw();
        assert!(object.is_raw());
        assert!(!Value::from(object).is_wrappable());
    }

    #[test]
    fn set_membership_uses_identity() {
        let set = SetValue::new();
        assert!(set.add(f64::NAN));
        assert!(!set.add(f64::NAN));
        assert!(set.add(-0.0));
        assert!(set.add(0.0));
        assert_eq!(set.len(), 3);
        assert!(!set.contains(&Value::from("x")));
    }

    #[test]
    fn non_finite_numbers_serialize_as_null() {
        assert_eq!(Value::Number(f64::INFINITY).to_json().unwrap(), serde_json::Value::Null);
        assert_eq!(Value::from(Date::from_millis(42)).to_json().unwrap(), json!(42));
    }

    #[test]
    fn self_referencing_object_fails_to_serialize() {
        let object = Object::from_fields([("a", 1)]);
        object.insert("me", object.clone());

        let err = Value::Object(object.clone()).to_json().unwrap_err();
        assert!(err.to_string().contains("cyclic object"));

        // Break the cycle so the object can drop.
        object.remove("me");
    }

    #[test]
    fn cycle_through_a_list_fails_to_serialize() {
        let object = Object::new();
        let list = List::new();
        list.push(object.clone());
        object.insert("items", list.clone());

        assert!(Value::from(list.clone()).to_json().is_err());
        object.remove("items");
        assert_eq!(Value::from(list).to_json().unwrap(), json!([{}]));
    }

    #[test]
    fn shared_object_is_not_a_cycle() {
        let shared = Object::from_fields([("x", 1)]);
        let outer = Object::from_fields([("left", shared.clone()), ("right", shared)]);

        assert_eq!(
            Value::from(outer).to_json().unwrap(),
            json!({"left": {"x": 1.0}, "right": {"x": 1.0}})
        );
    }
}
