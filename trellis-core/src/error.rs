//! Error Types
//!
//! Every failure the reactive graph can report flows through
//! [`ReactiveError`]. Most of them never reach a caller: effect bodies,
//! cleanups and subscriber callbacks are caught and logged where they happen
//! so one misbehaving consumer cannot stall the rest of the graph. The only
//! errors handed back to user code are computed evaluation failures and
//! misuse of the object layer.

use thiserror::Error;

use crate::object::ObjectId;
use crate::reactive::SubscriberId;

/// Boxed error returned by fallible user closures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Crate-wide result alias.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

/// Errors produced by the reactive graph.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A computed value's function failed.
    ///
    /// The computed stays dirty and keeps its previous cached value, so the
    /// next read retries the evaluation.
    #[error("computed {id} failed to evaluate: {source}")]
    Computation {
        id: SubscriberId,
        #[source]
        source: BoxError,
    },

    /// A computed value was read while it was being evaluated.
    #[error("computed {0} read itself while evaluating")]
    CircularDependency(SubscriberId),

    /// An effect body returned an error.
    #[error("effect failed: {0}")]
    Effect(#[source] BoxError),

    /// An effect cleanup returned an error.
    #[error("effect cleanup failed: {0}")]
    Cleanup(#[source] BoxError),

    /// A callback panicked; the payload message is preserved.
    #[error("callback panicked: {0}")]
    Panicked(String),

    /// The object was explicitly excluded from reactivity.
    #[error("object {0} is marked raw and cannot be made reactive")]
    RawObject(ObjectId),

    /// A reactive object was requested for a value that is not a plain object.
    #[error("value is not a plain object")]
    NotAnObject,
}

impl ReactiveError {
    /// Build a [`ReactiveError::Panicked`] from a `catch_unwind` payload.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }
}
