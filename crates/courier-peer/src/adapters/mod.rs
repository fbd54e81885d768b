//! Adapters Layer
//!
//! Concrete implementations of the ports:
//! - `MemoryHub` / `MemoryTransport` - in-process transport for tests and demos

pub mod memory;

pub use memory::{MemoryConnection, MemoryHub, MemoryTransport, CLOSED_REASON};
