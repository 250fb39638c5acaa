//! Integration Tests for the Reactive System
//!
//! These tests verify that signals, computed values, effects and reactive
//! objects work together correctly through the public API.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::json;
use trellis_core::object::{reactive, Object, ReactiveObject, Value};
use trellis_core::reactive::{
    batch, untracked, Cleanup, Computed, ComputedState, Effect, Runtime, Signal,
};
use trellis_core::ReactiveError;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn counter() -> Rc<Cell<usize>> {
    Rc::new(Cell::new(0))
}

fn object(json: serde_json::Value) -> Object {
    match Value::from(json) {
        Value::Object(object) => object,
        other => panic!("expected an object, got {}", other.type_name()),
    }
}

/// Writing the current value again logs nothing; a real change logs once.
#[test]
fn effect_logs_once_per_change() {
    init_tracing();
    let s = Signal::new(0);
    let log = Rc::new(RefCell::new(Vec::new()));

    let effect = Effect::new({
        let s = s.clone();
        let log = log.clone();
        move || log.borrow_mut().push(s.get())
    });

    s.set(0);
    assert_eq!(*log.borrow(), vec![0]);

    s.set(1);
    assert_eq!(*log.borrow(), vec![0, 1]);
    effect.stop();
}

/// Writing a sibling property does not re-run a reader of `a`.
#[test]
fn object_property_granularity() {
    init_tracing();
    let o = ReactiveObject::new(&object(json!({"a": 1, "b": 2}))).unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));

    let effect = Effect::new({
        let o = o.clone();
        let log = log.clone();
        move || log.borrow_mut().push(o.get("a").and_then(|a| a.as_f64()))
    });

    o.set("b", 99);
    assert_eq!(*log.borrow(), vec![Some(1.0)]);

    o.set("a", 5);
    assert_eq!(*log.borrow(), vec![Some(1.0), Some(5.0)]);
    effect.stop();
}

/// Two writes inside a batch re-run a reader of both exactly once.
#[test]
fn batch_coalesces_effect_runs() {
    init_tracing();
    let s1 = Signal::new(0);
    let s2 = Signal::new(0);
    let runs = counter();

    let effect = Effect::new({
        let (s1, s2, runs) = (s1.clone(), s2.clone(), runs.clone());
        move || {
            s1.get();
            s2.get();
            runs.set(runs.get() + 1);
        }
    });

    batch(|| {
        s1.set(1);
        s2.set(2);
        assert_eq!(runs.get(), 1);
    });

    assert_eq!(runs.get(), 2);
    effect.stop();
}

/// Each node of a diamond evaluates once per change, not once per edge.
#[test]
fn diamond_evaluates_each_node_once() {
    init_tracing();
    let a = Signal::new(1);
    let b = Signal::new(10);
    let c_runs = counter();
    let d_runs = counter();

    let c = Computed::new({
        let (a, c_runs) = (a.clone(), c_runs.clone());
        move || {
            c_runs.set(c_runs.get() + 1);
            a.get() * 2
        }
    });
    let d = Computed::new({
        let (a, b, d_runs) = (a.clone(), b.clone(), d_runs.clone());
        move || {
            d_runs.set(d_runs.get() + 1);
            a.get() + b.get()
        }
    });
    let sum = Computed::new({
        let (c, d) = (c.clone(), d.clone());
        move || c.get() + d.get()
    });

    assert_eq!(sum.get(), 13);
    assert_eq!((c_runs.get(), d_runs.get()), (1, 1));

    a.set(2);
    assert_eq!(c.state(), ComputedState::Dirty);
    assert_eq!(d.state(), ComputedState::Dirty);
    assert_eq!(sum.state(), ComputedState::Dirty);

    assert_eq!(sum.get(), 16);
    assert_eq!((c_runs.get(), d_runs.get()), (2, 2));
}

/// An effect over a diamond sees one consistent run per write.
#[test]
fn diamond_feeding_effect_runs_once_without_glitches() {
    init_tracing();
    let a = Signal::new(1);
    let left = Computed::new({
        let a = a.clone();
        move || a.get() + 1
    });
    let right = Computed::new({
        let a = a.clone();
        move || a.get() * 10
    });
    let seen = Rc::new(RefCell::new(Vec::new()));

    let effect = Effect::new({
        let (left, right, seen) = (left.clone(), right.clone(), seen.clone());
        move || seen.borrow_mut().push((left.get(), right.get()))
    });

    a.set(2);
    assert_eq!(*seen.borrow(), vec![(2, 10), (3, 20)]);
    effect.stop();
}

/// A computed runs at most once between reads, however many writes land.
#[test]
fn computed_is_lazy_between_reads() {
    init_tracing();
    let s = Signal::new(0);
    let runs = counter();
    let c = Computed::new({
        let (s, runs) = (s.clone(), runs.clone());
        move || {
            runs.set(runs.get() + 1);
            s.get()
        }
    });

    for i in 1..=10 {
        s.set(i);
    }
    assert_eq!(runs.get(), 1);
    assert_eq!(c.get(), 10);
    assert_eq!(runs.get(), 2);
}

/// Reads never change what they read.
#[test]
fn reads_are_referentially_transparent() {
    init_tracing();
    let s = Signal::new(String::from("x"));
    let c = Computed::new({
        let s = s.clone();
        move || format!("{}!", s.get())
    });

    for _ in 0..3 {
        assert_eq!(s.get(), "x");
        assert_eq!(c.get(), "x!");
        assert_eq!(untracked(|| c.get()), "x!");
    }
}

/// Cleanups run before the next body and before the stop handle returns.
#[test]
fn cleanup_ordering() {
    init_tracing();
    let s = Signal::new(0);
    let events = Rc::new(RefCell::new(Vec::new()));

    let effect = Effect::new({
        let (s, events) = (s.clone(), events.clone());
        move || {
            let value = s.get();
            events.borrow_mut().push(format!("body {value}"));
            let events = events.clone();
            Cleanup::new(move || events.borrow_mut().push(format!("cleanup {value}")))
        }
    });

    s.set(1);
    s.set(2);
    effect.stop();
    effect.stop();

    assert_eq!(
        *events.borrow(),
        vec!["body 0", "cleanup 0", "body 1", "cleanup 1", "body 2", "cleanup 2"]
    );
}

/// A failing computed reports to its reader, stays dirty, keeps its stale
/// value, and recovers on a later successful read.
#[test]
fn failing_computed_recovers() {
    init_tracing();
    let s = Signal::new(1);
    let c = Computed::try_new({
        let s = s.clone();
        move || {
            let value = s.get();
            if value < 0 {
                return Err(format!("negative input {value}"));
            }
            Ok(value * 100)
        }
    })
    .unwrap();

    s.set(-1);
    assert!(matches!(c.try_get(), Err(ReactiveError::Computation { .. })));
    assert_eq!(c.state(), ComputedState::Dirty);
    assert!(c.has_value());

    s.set(2);
    assert_eq!(c.try_get().unwrap(), 200);
    assert_eq!(c.state(), ComputedState::Clean);
}

/// One failing subscriber does not stop delivery to the rest.
#[test]
fn panicking_subscriber_does_not_block_others() {
    init_tracing();
    let s = Signal::new(0);
    let after = counter();

    s.subscribe(|| panic!("subscriber failed"));
    s.subscribe({
        let after = after.clone();
        move || after.set(after.get() + 1)
    });

    assert!(s.set(1));
    assert_eq!(after.get(), 1);
}

/// A stopped effect never runs again, even if already queued.
#[test]
fn stopped_effect_stays_stopped() {
    init_tracing();
    let s = Signal::new(0);
    let runs = counter();
    let effect = Effect::new({
        let (s, runs) = (s.clone(), runs.clone());
        move || {
            s.get();
            runs.set(runs.get() + 1);
        }
    });

    batch(|| {
        s.set(1);
        effect.stop();
    });
    s.set(2);

    assert_eq!(runs.get(), 1);
    assert_eq!(Runtime::effect_count(), 0);
}

/// Effects attribute reads to the innermost consumer.
#[test]
fn computed_read_inside_effect_is_attributed_to_the_computed() {
    init_tracing();
    let s = Signal::new(1);
    let c = Computed::new({
        let s = s.clone();
        move || s.get() + 1
    });
    let runs = counter();

    let effect = Effect::new({
        let (c, runs) = (c.clone(), runs.clone());
        move || {
            c.get();
            runs.set(runs.get() + 1);
        }
    });

    assert_eq!(s.subscriber_count(), 1);
    assert_eq!(c.subscriber_count(), 1);

    s.set(5);
    assert_eq!(runs.get(), 2);
    effect.stop();
}

/// Dependencies are rebuilt on every run.
#[test]
fn conditional_dependencies_are_dropped() {
    init_tracing();
    let flag = Signal::new(true);
    let a = Signal::new(0);
    let b = Signal::new(0);
    let runs = counter();

    let effect = Effect::new({
        let (flag, a, b, runs) = (flag.clone(), a.clone(), b.clone(), runs.clone());
        move || {
            runs.set(runs.get() + 1);
            if flag.get() {
                a.get();
            } else {
                b.get();
            }
        }
    });

    flag.set(false);
    assert_eq!(runs.get(), 2);
    assert_eq!(a.subscriber_count(), 0);

    a.set(1);
    assert_eq!(runs.get(), 2);

    b.set(1);
    assert_eq!(runs.get(), 3);
    effect.stop();
}

/// The unified entry point wraps plain objects and boxes everything else.
#[test]
fn reactive_entry_point_round_trip() {
    init_tracing();
    let state = reactive(Value::from(json!({"user": {"name": "ada"}, "tags": ["a"]})));
    let state = state.as_object().unwrap().clone();
    let names = Rc::new(RefCell::new(Vec::new()));

    let effect = Effect::new({
        let (state, names) = (state.clone(), names.clone());
        move || {
            let name = state
                .get("user")
                .and_then(|user| user.as_object().and_then(|u| u.get("name")))
                .and_then(|name| name.as_str().map(str::to_string));
            names.borrow_mut().push(name);
        }
    });

    let user = state.get("user").unwrap();
    user.as_object().unwrap().set("name", "grace");

    assert_eq!(
        *names.borrow(),
        vec![Some("ada".to_string()), Some("grace".to_string())]
    );
    assert_eq!(
        state.to_raw().get("user").map(|u| u.to_json().unwrap()),
        Some(json!({"name": "grace"}))
    );
    effect.stop();
}
