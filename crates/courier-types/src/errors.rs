//! # Error Types
//!
//! Errors raised while building, encoding or decoding packets.

use crate::packet::{PacketKind, PacketType};
use thiserror::Error;

/// Errors from the packet model and wire codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// Serializing a packet or payload failed.
    #[error("Encode error: {0}")]
    Encode(String),

    /// The bytes did not decode into a packet or payload.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Encoded frame is larger than the configured limit.
    #[error("Packet too large: limit is {limit} bytes")]
    TooLarge { limit: u64 },

    /// Frame was produced by an incompatible wire version.
    #[error("Unsupported wire version: received {received}, supported {supported}")]
    UnsupportedVersion { received: u16, supported: u16 },

    /// The payload carries a different concrete message type.
    #[error("Unexpected packet type: expected {expected}, got {actual}")]
    UnexpectedType {
        expected: PacketType,
        actual: PacketType,
    },

    /// The packet is of a different kind than the caller required.
    #[error("Unexpected packet kind: expected {expected}, got {actual}")]
    UnexpectedKind {
        expected: PacketKind,
        actual: PacketKind,
    },

    /// A request has not been given an identifier yet.
    #[error("Request has no identifier")]
    MissingIdentifier,
}
