//! Error types for request correlation.

use courier_types::{PacketError, PacketType, RequestId};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to the caller of a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The caller asked for one response type while the request declares another.
    /// Raised before anything is registered or sent.
    #[error("Requested response type '{requested}' but the request declares '{declared}'")]
    ResponseTypeMismatch {
        requested: PacketType,
        declared: PacketType,
    },

    /// A caller-assigned identifier collides with a request still pending.
    #[error("Request {id} is already pending")]
    DuplicateIdentifier { id: RequestId },

    /// No response arrived before the deadline.
    #[error("Request {id} timed out after {}ms", .waited.as_millis())]
    TimedOut { id: RequestId, waited: Duration },

    /// The response arrived but could not be decoded.
    #[error("Response rejected: {0}")]
    Packet(#[from] PacketError),
}
