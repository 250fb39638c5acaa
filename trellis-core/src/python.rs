//! Python Bindings
//!
//! Exposes the reactive primitives to Python. Values are arbitrary Python
//! objects; a write is a change when the new object is not the current one
//! (`is` semantics). Python callbacks that raise inside an effect or a
//! subscriber are logged like any other failing callback.
//!
//! Every class is `unsendable`: a reactive graph belongs to the thread that
//! built it.

use pyo3::exceptions::PyRuntimeError;
use pyo3::prelude::*;

use crate::error::ReactiveError;
use crate::reactive::{self, Cleanup, Computed, Effect, SameValue, Signal, Subscription};

/// A Python object held by the graph.
pub struct PyValue(PyObject);

impl Clone for PyValue {
    fn clone(&self) -> Self {
        Python::with_gil(|py| Self(self.0.clone_ref(py)))
    }
}

impl SameValue for PyValue {
    fn same_value(&self, other: &Self) -> bool {
        self.0.as_ptr() == other.0.as_ptr()
    }
}

fn to_py_err(err: ReactiveError) -> PyErr {
    PyRuntimeError::new_err(err.to_string())
}

/// Wrap a Python callable as a notification callback.
fn callback(callable: PyObject) -> impl Fn() + 'static {
    move || {
        Python::with_gil(|py| {
            if let Err(err) = callable.call0(py) {
                tracing::error!(error = %err, "python callback failed");
            }
        })
    }
}

/// Python-exposed Signal type.
#[pyclass(name = "Signal", unsendable)]
pub struct PySignal {
    inner: Signal<PyValue>,
}

#[pymethods]
impl PySignal {
    /// Create a new signal with the given initial value.
    #[new]
    fn new(value: PyObject) -> Self {
        Self {
            inner: Signal::new(PyValue(value)),
        }
    }

    /// Get the current value, tracking the read.
    #[getter]
    fn value(&self, py: Python<'_>) -> PyObject {
        self.inner.with(|value| value.0.clone_ref(py))
    }

    /// Set a new value.
    #[setter]
    fn set_value(&self, value: PyObject) {
        self.inner.set(PyValue(value));
    }

    /// Set the value to `f(current)`. Returns whether it changed.
    fn update(&self, py: Python<'_>, f: PyObject) -> PyResult<bool> {
        self.inner.try_update(|current| f.call1(py, (current.0,)).map(PyValue))
    }

    /// Read without tracking.
    fn peek(&self, py: Python<'_>) -> PyObject {
        reactive::untracked(|| self.value(py))
    }

    /// Call `callback()` after every change.
    fn subscribe(&self, callable: PyObject) -> PySubscription {
        PySubscription {
            inner: self.inner.subscribe(callback(callable)),
        }
    }

    /// Get the signal's unique ID.
    #[getter]
    fn id(&self) -> u64 {
        self.inner.id()
    }

    /// Get the number of subscribers.
    fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }

    fn __repr__(&self, py: Python<'_>) -> String {
        let repr = self
            .peek(py)
            .bind(py)
            .repr()
            .map(|r| r.to_string())
            .unwrap_or_else(|_| "?".to_string());
        format!(
            "Signal(id={}, value={}, subscribers={})",
            self.inner.id(),
            repr,
            self.subscriber_count()
        )
    }
}

/// Python-exposed Computed type.
#[pyclass(name = "Computed", unsendable)]
pub struct PyComputed {
    inner: Computed<PyValue>,
}

#[pymethods]
impl PyComputed {
    /// Create a computed value from a zero-argument callable.
    ///
    /// Raises if the first evaluation fails.
    #[new]
    fn new(f: PyObject) -> PyResult<Self> {
        let inner = Computed::try_new(move || Python::with_gil(|py| f.call0(py)).map(PyValue))
            .map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Get the current value, re-evaluating if dirty.
    #[getter]
    fn value(&self, py: Python<'_>) -> PyResult<PyObject> {
        self.inner
            .try_get()
            .map(|value| value.0.clone_ref(py))
            .map_err(to_py_err)
    }

    /// Call `callback()` whenever the value becomes dirty.
    fn subscribe(&self, callable: PyObject) -> PySubscription {
        PySubscription {
            inner: self.inner.subscribe(callback(callable)),
        }
    }

    /// Whether the value must be re-evaluated on the next read.
    #[getter]
    fn dirty(&self) -> bool {
        self.inner.state() == reactive::ComputedState::Dirty
    }

    fn __repr__(&self) -> String {
        format!(
            "Computed(id={}, dirty={}, dependencies={})",
            self.inner.id(),
            self.dirty(),
            self.inner.dependency_count()
        )
    }
}

/// Python-exposed Effect type.
#[pyclass(name = "Effect", unsendable)]
pub struct PyEffect {
    inner: Effect,
}

#[pymethods]
impl PyEffect {
    /// Run `f()` now and again whenever what it read changes.
    ///
    /// If `f` returns a callable, it is called before the next run and when
    /// the effect stops.
    #[new]
    fn new(f: PyObject) -> Self {
        let inner = Effect::new(move || -> PyResult<Option<Cleanup>> {
            Python::with_gil(|py| {
                let out = f.call0(py)?;
                if out.is_none(py) {
                    return Ok(None);
                }
                Ok(Some(Cleanup::try_new(move || {
                    Python::with_gil(|py| out.call0(py).map(drop))
                })))
            })
        });
        Self { inner }
    }

    /// Stop the effect for good.
    fn stop(&self) {
        self.inner.stop();
    }

    #[getter]
    fn stopped(&self) -> bool {
        self.inner.is_stopped()
    }

    #[getter]
    fn run_count(&self) -> usize {
        self.inner.run_count()
    }

    fn __repr__(&self) -> String {
        format!(
            "Effect(id={}, runs={}, stopped={})",
            self.inner.id(),
            self.inner.run_count(),
            self.inner.is_stopped()
        )
    }
}

/// Handle returned by `subscribe`.
#[pyclass(name = "Subscription", unsendable)]
pub struct PySubscription {
    inner: Subscription,
}

#[pymethods]
impl PySubscription {
    fn unsubscribe(&self) {
        self.inner.unsubscribe();
    }
}

/// Run `f()` with notifications deferred until it returns.
#[pyfunction]
fn batch(py: Python<'_>, f: PyObject) -> PyResult<PyObject> {
    reactive::batch(|| f.call0(py))
}

/// Run `f()` without tracking the reads it performs.
#[pyfunction]
fn untracked(py: Python<'_>, f: PyObject) -> PyResult<PyObject> {
    reactive::untracked(|| f.call0(py))
}

/// Register the Python surface on `m`.
pub(crate) fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PySignal>()?;
    m.add_class::<PyComputed>()?;
    m.add_class::<PyEffect>()?;
    m.add_class::<PySubscription>()?;
    m.add_function(wrap_pyfunction!(batch, m)?)?;
    m.add_function(wrap_pyfunction!(untracked, m)?)?;
    Ok(())
}
