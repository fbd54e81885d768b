//! # Courier Test Suite
//!
//! Scenarios that span several crates, run over the in-memory transport.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── request_response.rs   # round trips, timeouts, late and stray responses
//!     ├── dispatch.rs           # listener ordering, isolation, malformed frames
//!     └── authentication.rs     # hail judging and denial reasons
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p courier-tests
//! cargo test -p courier-tests integration::dispatch::
//! ```

pub mod integration;
