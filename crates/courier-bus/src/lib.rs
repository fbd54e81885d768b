//! # Courier Bus - Typed Multicast Dispatch
//!
//! Fans an inbound packet out to every callback registered for its kind.
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!   dispatch() ──→│ CallbackRegistry             │
//!                 │  Data     → [cb1, cb2, ...]  │──→ invoked in order
//!                 │  Request  → [...]            │
//!                 │  Response → [...]            │
//!                 │  Connect  → [...]            │
//!                 └──────────────────────────────┘
//! ```
//!
//! ## Rules
//!
//! - Callbacks run synchronously on the dispatching thread, strictly in
//!   registration order.
//! - A failing or panicking callback never stops its siblings; failures are
//!   collected into a [`DispatchReport`] for the caller to surface.
//! - Registering the same callback twice means it is invoked twice.
//!   Unregistering removes the first entry with the same identity.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod callback;
pub mod listeners;
pub mod registry;

pub use callback::{callback, same_callback, Callback, CallbackError};
pub use listeners::{panic_message, CallbackFailure, DispatchReport, ListenerList};
pub use registry::CallbackRegistry;
