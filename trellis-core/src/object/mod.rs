//! Object Reactivity
//!
//! Plain keyed objects and the layer that makes them reactive one property
//! at a time.
//!
//! # Concepts
//!
//! ## Values
//!
//! [`Value`] is the dynamic value stored in an [`Object`]. Plain objects are
//! the only values that can be wrapped; lists, dates, patterns, maps and
//! sets are opaque and react only when the reference holding them is
//! replaced.
//!
//! ## Reactive Objects
//!
//! A [`ReactiveObject`] keeps one subscriber set per property. A consumer
//! that reads `a` re-runs when `a` is written or deleted, and never when a
//! sibling property changes. Wrapping is cached per object, so every wrapper
//! of the same object shares the same subscribers.

mod proxy;
mod value;

pub use proxy::{
    cached_wrapper_count, reactive, shallow_reactive, to_raw, Property, ReactiveObject,
    ReactiveValue, WrapMode,
};
pub use value::{Date, List, MapValue, Object, ObjectId, Pattern, SetValue, Value};
