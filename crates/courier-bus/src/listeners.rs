//! # Listener Lists
//!
//! An ordered, thread-safe list of callbacks with isolated invocation.

use crate::callback::{same_callback, Callback, CallbackError};
use courier_types::Origin;
use parking_lot::RwLock;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::debug;

/// One callback that failed during a fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackFailure {
    /// Label of the list the callback belongs to.
    pub listener: &'static str,
    /// Position of the callback in that list at dispatch time.
    pub index: usize,
    /// What went wrong.
    pub error: CallbackError,
}

/// Outcome of invoking one or more listener lists for a single event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Callbacks that ran to completion without error.
    pub succeeded: usize,
    /// Callbacks that returned an error or panicked.
    pub failures: Vec<CallbackFailure>,
}

impl DispatchReport {
    /// Total callbacks attempted.
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failures.len()
    }

    /// Whether every callback succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fold another report into this one, keeping failure order.
    pub fn merge(&mut self, other: DispatchReport) {
        self.succeeded += other.succeeded;
        self.failures.extend(other.failures);
    }
}

/// Ordered multicast list of callbacks for events of type `T`.
pub struct ListenerList<T: 'static> {
    label: &'static str,
    callbacks: RwLock<Vec<Callback<T>>>,
}

impl<T: 'static> ListenerList<T> {
    /// Create an empty list; `label` names it in failure reports.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            callbacks: RwLock::new(Vec::new()),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Append a callback. Duplicates are allowed and invoked once per entry.
    pub fn add(&self, callback: Callback<T>) {
        self.callbacks.write().push(callback);
    }

    /// Remove the first entry with the same identity as `callback`.
    ///
    /// Returns `false` if no entry matched.
    pub fn remove(&self, callback: &Callback<T>) -> bool {
        let mut callbacks = self.callbacks.write();
        match callbacks.iter().position(|c| same_callback(c, callback)) {
            Some(index) => {
                callbacks.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.read().is_empty()
    }

    pub fn clear(&self) {
        self.callbacks.write().clear();
    }

    /// Invoke every callback in registration order.
    ///
    /// The list is snapshotted first, so callbacks may add or remove entries
    /// without deadlocking; such changes apply from the next event on.
    pub fn invoke(&self, event: &T, origin: &Origin) -> DispatchReport {
        let snapshot: Vec<Callback<T>> = self.callbacks.read().clone();
        let mut report = DispatchReport::default();

        for (index, callback) in snapshot.iter().enumerate() {
            match invoke_isolated(callback, event, origin) {
                Ok(()) => report.succeeded += 1,
                Err(error) => {
                    debug!(listener = self.label, index, error = %error, "Callback failed");
                    report.failures.push(CallbackFailure {
                        listener: self.label,
                        index,
                        error,
                    });
                }
            }
        }

        report
    }
}

fn invoke_isolated<T>(
    callback: &Callback<T>,
    event: &T,
    origin: &Origin,
) -> Result<(), CallbackError> {
    match catch_unwind(AssertUnwindSafe(|| callback(event, origin))) {
        Ok(result) => result,
        Err(panic) => Err(CallbackError::Panicked(panic_message(panic.as_ref()))),
    }
}

/// Text of a caught panic payload.
pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
