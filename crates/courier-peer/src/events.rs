//! # Local Error Channel
//!
//! Faults the peer resolves on its own (denying a connection, dropping a
//! packet, isolating a callback) are still reported here, so applications can
//! observe them without the delivery loop ever failing.

use courier_bus::CallbackFailure;
use courier_types::{ConnectionId, Origin, PacketError};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, warn};

/// A fault the peer handled locally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocalError {
    #[error("Could not deserialize packet from {origin}: {error}")]
    Deserialization { origin: Origin, error: PacketError },

    #[error("Authentication of {remote} on {connection} failed: {reason}")]
    Authentication {
        connection: ConnectionId,
        remote: SocketAddr,
        reason: String,
    },

    #[error("Listener '{}' #{} failed for {origin}: {}", .failure.listener, .failure.index, .failure.error)]
    Callback {
        origin: Origin,
        failure: CallbackFailure,
    },

    #[error("Transport: {0}")]
    Transport(String),
}

/// Broadcasts [`LocalError`]s to every subscriber.
#[derive(Clone)]
pub struct ErrorChannel {
    sender: broadcast::Sender<LocalError>,
}

impl ErrorChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Log and broadcast `error`. Returns how many subscribers received it.
    pub fn publish(&self, error: LocalError) -> usize {
        match &error {
            LocalError::Callback { .. } => error!(error = %error, "Local error"),
            _ => warn!(error = %error, "Local error"),
        }

        // No subscribers is fine; the error was already logged.
        self.sender.send(error).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LocalError> {
        self.sender.subscribe()
    }

    /// Stream of errors published from now on. Lagged entries are skipped.
    pub fn stream(&self) -> impl Stream<Item = LocalError> + Send + 'static {
        BroadcastStream::new(self.sender.subscribe()).filter_map(|item| match item {
            Ok(error) => Some(error),
            Err(lagged) => {
                debug!(error = %lagged, "Local error subscriber lagged");
                None
            }
        })
    }
}
