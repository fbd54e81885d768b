//! # Callbacks
//!
//! The one callback shape shared by every listener table.

use courier_types::Origin;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors a callback reports back to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    /// The callback returned an error.
    #[error("{0}")]
    Failed(String),

    /// The callback panicked; the payload message is preserved when it is a string.
    #[error("Callback panicked: {0}")]
    Panicked(String),
}

impl CallbackError {
    /// Build a [`CallbackError::Failed`] from any displayable error.
    pub fn failed(reason: impl fmt::Display) -> Self {
        CallbackError::Failed(reason.to_string())
    }
}

/// A shared listener invoked with the event and where it came from.
///
/// Identity is the `Arc` allocation: keep a clone to unregister later.
pub type Callback<T> = Arc<dyn Fn(&T, &Origin) -> Result<(), CallbackError> + Send + Sync>;

/// Box a closure as a [`Callback`].
pub fn callback<T, F>(f: F) -> Callback<T>
where
    T: 'static,
    F: Fn(&T, &Origin) -> Result<(), CallbackError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Whether two callbacks are the same registration.
///
/// Compares the data address only; vtable pointers are not stable across
/// codegen units.
pub fn same_callback<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
