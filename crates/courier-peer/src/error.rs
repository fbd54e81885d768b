//! Errors returned to callers of the peer API.
//!
//! Faults on the inbound path never surface here; they go to the
//! [`ErrorChannel`](crate::events::ErrorChannel).

use crate::config::ConfigError;
use crate::ports::TransportError;
use courier_requests::RequestError;
use courier_types::{ConnectionId, PacketError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Connection {connection} was not approved within {}ms", .waited.as_millis())]
    ConnectTimeout {
        connection: ConnectionId,
        waited: Duration,
    },

    #[error("Connection {connection} was refused: {reason}")]
    ConnectionRefused {
        connection: ConnectionId,
        reason: String,
    },

    #[error("Peer must be started inside a tokio runtime")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, PeerError>;
