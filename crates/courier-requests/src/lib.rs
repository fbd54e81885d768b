//! # Courier Requests - Correlation Under a Timeout Race
//!
//! Tracks every outstanding request until exactly one of two things happens:
//! its response arrives, or its deadline passes.
//!
//! ```text
//!   register() ──→ Pending ──┬── handle_response() ──→ Completed ──→ on_response
//!                            │
//!                            └── sweep_expired()   ──→ TimedOut  ──→ on_timeout
//! ```
//!
//! ## Guarantees
//!
//! - Identifiers come from a per-registry counter starting at 1.
//! - The terminal transition is a compare-and-swap on the handle's state; the
//!   winner alone removes the entry and runs its callback, so exactly one
//!   callback fires exactly once per request.
//! - Responses for unknown or already-finished requests are dropped and
//!   counted, never reported as errors.
//! - Callbacks never run under a map shard lock.
//!
//! [`CompletionCell`] and [`PendingResponse`] turn the callback pair into
//! something a caller can `.await`.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod clock;
pub mod completion;
pub mod error;
pub mod handle;
pub mod pending;
pub mod registry;
pub mod stats;

pub use clock::{Clock, ManualClock, TokioClock};
pub use completion::CompletionCell;
pub use error::RequestError;
pub use handle::{ExpiredRequest, RequestState};
pub use pending::{PendingResponse, RequestOutcome};
pub use registry::{RequestRegistry, ResponseRouting};
pub use stats::{RequestStats, RequestStatsSnapshot};
