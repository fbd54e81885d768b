//! Transport Port (Driven Port)
//!
//! The transport owns connection lifecycle and delivery guarantees. It hands
//! the peer raw events through a [`TransportEvent`] stream and accepts
//! already-encoded frames for sending.

use crate::config::DeliveryOptions;
use courier_types::{ConnectionId, Origin};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

/// Errors reported synchronously by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("No endpoint bound at {0}")]
    UnknownAddress(SocketAddr),

    #[error("Unknown connection {0}")]
    UnknownConnection(ConnectionId),

    #[error("Connection {0} is not established")]
    NotConnected(ConnectionId),

    #[error("Connection {0} was already approved or denied")]
    AlreadyAnswered(ConnectionId),

    #[error("Address {0} is already bound")]
    AddressInUse(SocketAddr),

    #[error("Transport closed")]
    Closed,
}

/// Where an outbound frame goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Connection(ConnectionId),
    Unconnected(SocketAddr),
}

impl From<Origin> for Destination {
    /// Reply to whoever sent a packet.
    fn from(origin: Origin) -> Self {
        match origin {
            Origin::Connection(id) => Destination::Connection(id),
            Origin::Unconnected(addr) => Destination::Unconnected(addr),
        }
    }
}

impl From<ConnectionId> for Destination {
    fn from(id: ConnectionId) -> Self {
        Destination::Connection(id)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Connection(id) => write!(f, "{id}"),
            Destination::Unconnected(addr) => write!(f, "unconnected:{addr}"),
        }
    }
}

/// Send side of a transport.
///
/// Sending is fire-and-forget: `Ok` means the frame was queued, not delivered.
pub trait Transport: Send + Sync + 'static {
    fn local_address(&self) -> SocketAddr;

    fn send(
        &self,
        frame: Vec<u8>,
        destination: Destination,
        options: DeliveryOptions,
    ) -> Result<(), TransportError>;

    /// Start opening a connection, sending `hail` for the remote to judge.
    ///
    /// The outcome arrives later as a [`TransportEvent::StatusChanged`].
    fn connect(&self, address: SocketAddr, hail: Vec<u8>) -> Result<ConnectionId, TransportError>;

    fn disconnect(&self, connection: ConnectionId, reason: &str) -> Result<(), TransportError>;
}

/// A connection as seen by the peer that must judge or drop it.
pub trait Connection: Send + Sync + 'static {
    fn id(&self) -> ConnectionId;

    fn remote_address(&self) -> SocketAddr;

    /// Accept a pending connection.
    fn approve(&self) -> Result<(), TransportError>;

    /// Refuse a pending connection, or drop an established one, telling the
    /// remote why.
    fn deny(&self, reason: &str) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionStatus {
    /// Whether the connection attempt has been decided one way or the other.
    pub fn is_settled(&self) -> bool {
        !matches!(self, ConnectionStatus::Connecting)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticLevel {
    Debug,
    Warning,
    Error,
}

/// A raw frame received from the network.
#[derive(Clone)]
pub struct InboundMessage {
    pub origin: Origin,
    /// The connection it arrived on; `None` for unconnected datagrams.
    pub connection: Option<Arc<dyn Connection>>,
    pub payload: Vec<u8>,
}

impl fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundMessage")
            .field("origin", &self.origin)
            .field("len", &self.payload.len())
            .finish()
    }
}

/// Everything a transport reports to its peer.
#[derive(Clone)]
pub enum TransportEvent {
    Message(InboundMessage),
    /// A remote wants to connect; exactly one of approve/deny must follow.
    ConnectionApproval {
        connection: Arc<dyn Connection>,
        payload: Vec<u8>,
    },
    StatusChanged {
        connection: ConnectionId,
        status: ConnectionStatus,
        reason: Option<String>,
    },
    Diagnostic {
        level: DiagnosticLevel,
        message: String,
    },
}

impl fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportEvent::Message(message) => f.debug_tuple("Message").field(message).finish(),
            TransportEvent::ConnectionApproval { connection, payload } => f
                .debug_struct("ConnectionApproval")
                .field("connection", &connection.id())
                .field("remote", &connection.remote_address())
                .field("len", &payload.len())
                .finish(),
            TransportEvent::StatusChanged {
                connection,
                status,
                reason,
            } => f
                .debug_struct("StatusChanged")
                .field("connection", connection)
                .field("status", status)
                .field("reason", reason)
                .finish(),
            TransportEvent::Diagnostic { level, message } => f
                .debug_struct("Diagnostic")
                .field("level", level)
                .field("message", message)
                .finish(),
        }
    }
}
