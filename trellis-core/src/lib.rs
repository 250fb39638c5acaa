//! Trellis Core
//!
//! This crate provides the runtime for Trellis, a fine-grained reactive
//! state engine. It implements:
//!
//! - Reactive primitives (signals, computed values, effects, watchers)
//! - Push-dirty, pull-lazy change propagation
//! - Batched notification delivery
//! - Per-property reactivity for plain keyed objects
//!
//! The crate is designed to be used both as a native Rust library and, with
//! the `python` feature, as a Python extension module via PyO3.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `object`: The plain object model and its reactive wrapper
//! - `error`: The crate error type
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use trellis_core::reactive::{Computed, Effect, Signal};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let doubled = Computed::new({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create an effect
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let effect = Effect::new({
//!     let (count, doubled, log) = (count.clone(), doubled.clone(), log.clone());
//!     move || log.borrow_mut().push((count.get(), doubled.get()))
//! });
//!
//! // Update the signal; the effect runs again
//! count.set(5);
//! assert_eq!(*log.borrow(), vec![(0, 0), (5, 10)]);
//! effect.stop();
//! ```

pub mod error;
pub mod object;
pub mod reactive;

#[cfg(feature = "python")]
mod python;

pub use error::{BoxError, ReactiveError, Result};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// Python module definition.
///
/// This function is called by Python when importing the module.
/// It registers all Python-exposed types and functions.
#[cfg(feature = "python")]
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    python::register(m)?;

    // Add version info
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
