//! Watchers
//!
//! A watcher is an effect split in two: a tracked `source` that produces a
//! value, and an untracked `callback` that receives the new and previous
//! values whenever the source's value changes.
//!
//! The callback only runs when the produced value differs under
//! [`SameValue`]; a dependency change that yields the same value is
//! swallowed. The returned [`Effect`] is the stop handle.

use super::context::untracked;
use super::effect::{Cleanup, Effect, EffectOutput};
use super::same_value::SameValue;
use crate::error::BoxError;
use crate::object::{Property, ReactiveObject, Value};

/// Options shared by every watcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Call the callback on the first run as well, with the initial value
    /// passed as both new and old.
    pub immediate: bool,
}

impl WatchOptions {
    /// Options with `immediate` set.
    pub fn immediate() -> Self {
        Self { immediate: true }
    }
}

/// Watch the value produced by `source`.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use trellis_core::reactive::{watch, Signal, WatchOptions};
///
/// let count = Signal::new(1);
/// let changes = Rc::new(RefCell::new(Vec::new()));
///
/// let watcher = watch(
///     {
///         let count = count.clone();
///         move || count.get() * 10
///     },
///     {
///         let changes = changes.clone();
///         move |new: &i32, old: &i32| changes.borrow_mut().push((*new, *old))
///     },
///     WatchOptions::default(),
/// );
///
/// count.set(2);
/// watcher.stop();
/// assert_eq!(*changes.borrow(), vec![(20, 10)]);
/// ```
pub fn watch<T, S, C, O>(source: S, mut callback: C, options: WatchOptions) -> Effect
where
    T: Clone + SameValue + 'static,
    S: Fn() -> T + 'static,
    C: FnMut(&T, &T) -> O + 'static,
    O: EffectOutput,
{
    let mut previous: Option<T> = None;

    Effect::new(move || -> Result<Option<Cleanup>, BoxError> {
        let next = source();
        let old = match previous.replace(next.clone()) {
            None if options.immediate => next.clone(),
            None => return Ok(None),
            Some(old) if old.same_value(&next) => return Ok(None),
            Some(old) => old,
        };
        untracked(|| callback(&next, &old)).into_cleanup()
    })
}

/// Watch several sources of the same type at once.
///
/// The callback fires when any of the values changed and receives all new
/// values and all previous values, in source order.
pub fn watch_multiple<T, C, O>(
    sources: Vec<Box<dyn Fn() -> T>>,
    mut callback: C,
    options: WatchOptions,
) -> Effect
where
    T: Clone + SameValue + 'static,
    C: FnMut(&[T], &[T]) -> O + 'static,
    O: EffectOutput,
{
    let mut previous: Option<Vec<T>> = None;

    Effect::new(move || -> Result<Option<Cleanup>, BoxError> {
        let next: Vec<T> = sources.iter().map(|source| source()).collect();
        let old = match previous.replace(next.clone()) {
            None if options.immediate => next.clone(),
            None => return Ok(None),
            Some(old) if old.same_value(&next) => return Ok(None),
            Some(old) => old,
        };
        untracked(|| callback(&next, &old)).into_cleanup()
    })
}

/// Watch a single property of a reactive object.
///
/// Values are passed raw: a nested object arrives as a plain
/// [`Value::Object`]. A missing property is `None`.
pub fn watch_property<C, O>(
    object: &ReactiveObject,
    key: impl Into<String>,
    callback: C,
    options: WatchOptions,
) -> Effect
where
    C: FnMut(&Option<Value>, &Option<Value>) -> O + 'static,
    O: EffectOutput,
{
    let object = object.clone();
    let key = key.into();
    watch(
        move || object.get(&key).map(Property::into_value),
        callback,
        options,
    )
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;
    use crate::reactive::Signal;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[test]
    fn watch_skips_first_run_by_default() {
        let signal = Signal::new(1);
        let calls = Rc::new(Cell::new(0));

        let watcher = watch(
            {
                let signal = signal.clone();
                move || signal.get()
            },
            {
                let calls = calls.clone();
                move |_: &i32, _: &i32| calls.set(calls.get() + 1)
            },
            WatchOptions::default(),
        );

        assert_eq!(calls.get(), 0);
        signal.set(2);
        assert_eq!(calls.get(), 1);
        watcher.stop();
    }

    #[test]
    fn immediate_passes_initial_value_twice() {
        let signal = Signal::new(7);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let watcher = watch(
            {
                let signal = signal.clone();
                move || signal.get()
            },
            {
                let seen = seen.clone();
                move |new: &i32, old: &i32| seen.borrow_mut().push((*new, *old))
            },
            WatchOptions::immediate(),
        );

        signal.set(8);
        assert_eq!(*seen.borrow(), vec![(7, 7), (8, 7)]);
        watcher.stop();
    }

    #[test]
    fn unchanged_derived_value_is_swallowed() {
        let signal = Signal::new(2);
        let calls = Rc::new(Cell::new(0));

        let watcher = watch(
            {
                let signal = signal.clone();
                move || signal.get() % 2 == 0
            },
            {
                let calls = calls.clone();
                move |_: &bool, _: &bool| calls.set(calls.get() + 1)
            },
            WatchOptions::default(),
        );

        signal.set(4);
        assert_eq!(calls.get(), 0);
        signal.set(5);
        assert_eq!(calls.get(), 1);
        watcher.stop();
    }

    #[test]
    fn callback_reads_are_not_tracked() {
        let source = Signal::new(0);
        let other = Signal::new(0);
        let calls = Rc::new(Cell::new(0));

        let watcher = watch(
            {
                let source = source.clone();
                move || source.get()
            },
            {
                let other = other.clone();
                let calls = calls.clone();
                move |_: &i32, _: &i32| {
                    other.get();
                    calls.set(calls.get() + 1);
                }
            },
            WatchOptions::immediate(),
        );

        other.set(1);
        assert_eq!(calls.get(), 1);
        assert_eq!(other.subscriber_count(), 0);
        watcher.stop();
    }

    #[test]
    fn watch_multiple_fires_on_any_change() {
        let a = Signal::new(1);
        let b = Signal::new(2);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sources: Vec<Box<dyn Fn() -> i32>> = vec![
            Box::new({
                let a = a.clone();
                move || a.get()
            }),
            Box::new({
                let b = b.clone();
                move || b.get()
            }),
        ];

        let watcher = watch_multiple(
            sources,
            {
                let seen = seen.clone();
                move |new: &[i32], old: &[i32]| seen.borrow_mut().push((new.to_vec(), old.to_vec()))
            },
            WatchOptions::default(),
        );

        b.set(3);
        assert_eq!(*seen.borrow(), vec![(vec![1, 3], vec![1, 2])]);
        watcher.stop();
    }

    #[test]
    fn watch_property_sees_only_its_key() {
        let object = Object::new();
        object.insert("a", 1.0);
        object.insert("b", 2.0);
        let state = ReactiveObject::new(&object).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let watcher = watch_property(
            &state,
            "a",
            {
                let seen = seen.clone();
                move |new: &Option<Value>, old: &Option<Value>| {
                    let number = |v: &Option<Value>| v.as_ref().and_then(Value::as_f64);
                    seen.borrow_mut().push((number(new), number(old)));
                }
            },
            WatchOptions::default(),
        );

        state.set("b", 99.0);
        state.set("a", 5.0);
        state.delete("a");

        assert_eq!(
            *seen.borrow(),
            vec![(Some(5.0), Some(1.0)), (None, Some(5.0))]
        );
        watcher.stop();
    }
}
