//! # Dispatcher
//!
//! Turns transport events into packets and fans them out.
//!
//! ```text
//!   Message ──→ deserialize ──✗──→ deny connection, publish, stop
//!                   │
//!                   ✓
//!                   ├──→ listeners.packet
//!                   ├──→ CallbackRegistry (by kind)
//!                   └──→ Data     → listeners.data
//!                        Request  → listeners.request
//!                        Response → listeners.response → RequestRegistry
//!
//!   ConnectionApproval ──→ deserialize → must be Connect → Authenticator
//!                          ──→ approve + listeners.authenticated | deny(reason)
//! ```
//!
//! Nothing here returns an error to the delivery loop: every fault is resolved
//! locally and reported on the [`ErrorChannel`].

use crate::connections::ConnectionTable;
use crate::events::{ErrorChannel, LocalError};
use crate::listeners::{PeerListeners, StatusChange};
use crate::metrics::DispatchMetrics;
use crate::ports::{
    AuthDecision, Authenticator, Connection, ConnectionStatus, DiagnosticLevel, InboundMessage,
    PacketDeserializer, TransportError, TransportEvent, AUTH_REJECTED_REASON,
};
use courier_bus::{panic_message, CallbackRegistry, DispatchReport};
use courier_requests::{RequestRegistry, ResponseRouting};
use courier_types::{ConnectionId, Origin, Packet, PacketError, PacketKind};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Prefix of the reason sent when a frame cannot be deserialized.
pub const DESERIALIZATION_DENY_PREFIX: &str = "Failed to deserialize packet";

/// Reason sent when a connection request carries something other than a hail.
pub const EXPECTED_CONNECT_REASON: &str = "Expected a connect packet";

/// Reason sent when the authenticator panics.
pub const AUTHENTICATOR_PANIC_REASON: &str = "Authenticator panicked";

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Dispatched {
        kind: PacketKind,
        report: DispatchReport,
        /// Set for responses only.
        routing: Option<ResponseRouting>,
    },
    /// The frame did not deserialize; nothing was dispatched.
    Rejected(PacketError),
}

/// What happened to one connection request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved,
    Denied(String),
    /// The transport refused the approve call itself.
    TransportFailed(TransportError),
}

pub struct Dispatcher {
    deserializer: Arc<dyn PacketDeserializer>,
    authenticator: Arc<dyn Authenticator>,
    callbacks: Arc<CallbackRegistry>,
    listeners: Arc<PeerListeners>,
    requests: Arc<RequestRegistry>,
    connections: Arc<ConnectionTable>,
    errors: ErrorChannel,
    metrics: DispatchMetrics,
}

impl Dispatcher {
    pub fn new(
        deserializer: Arc<dyn PacketDeserializer>,
        authenticator: Arc<dyn Authenticator>,
        requests: Arc<RequestRegistry>,
        errors: ErrorChannel,
    ) -> Self {
        Self {
            deserializer,
            authenticator,
            callbacks: Arc::new(CallbackRegistry::new()),
            listeners: Arc::new(PeerListeners::new()),
            requests,
            connections: Arc::new(ConnectionTable::new()),
            errors,
            metrics: DispatchMetrics::new(),
        }
    }

    pub fn callbacks(&self) -> &Arc<CallbackRegistry> {
        &self.callbacks
    }

    pub fn listeners(&self) -> &Arc<PeerListeners> {
        &self.listeners
    }

    pub fn requests(&self) -> &Arc<RequestRegistry> {
        &self.requests
    }

    pub fn connections(&self) -> &Arc<ConnectionTable> {
        &self.connections
    }

    pub fn errors(&self) -> &ErrorChannel {
        &self.errors
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    pub fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Message(message) => {
                self.handle_message(message);
            }
            TransportEvent::ConnectionApproval {
                connection,
                payload,
            } => {
                self.handle_approval(connection.as_ref(), &payload);
            }
            TransportEvent::StatusChanged {
                connection,
                status,
                reason,
            } => self.handle_status(connection, status, reason),
            TransportEvent::Diagnostic { level, message } => {
                self.handle_diagnostic(level, &message)
            }
        }
    }

    /// Deserialize and fan out one inbound frame.
    pub fn handle_message(&self, message: InboundMessage) -> MessageOutcome {
        DispatchMetrics::incr(&self.metrics.messages_received);
        let InboundMessage {
            origin,
            connection,
            payload,
        } = message;

        let packet = match self.deserializer.deserialize(&payload) {
            Ok(packet) => packet,
            Err(error) => {
                DispatchMetrics::incr(&self.metrics.deserialization_failures);
                let reason = format!("{DESERIALIZATION_DENY_PREFIX}: {error}");
                match connection {
                    Some(connection) => self.deny(connection.as_ref(), &reason),
                    None => debug!(origin = %origin, "Dropping undecodable unconnected datagram"),
                }
                self.errors.publish(LocalError::Deserialization {
                    origin,
                    error: error.clone(),
                });
                return MessageOutcome::Rejected(error);
            }
        };

        DispatchMetrics::incr(&self.metrics.packets_dispatched);
        let kind = packet.kind();
        debug!(
            origin = %origin,
            kind = %kind,
            packet_type = packet.packet_type().map(|t| t.as_str()).unwrap_or("-"),
            "Dispatching packet"
        );

        let mut report = self.listeners.packet.invoke(&packet, &origin);
        report.merge(self.callbacks.dispatch(&packet, &origin));

        let mut routing = None;
        match packet {
            Packet::Data(data) => report.merge(self.listeners.data.invoke(&data, &origin)),
            Packet::Request(request) => {
                report.merge(self.listeners.request.invoke(&request, &origin))
            }
            Packet::Response(response) => {
                report.merge(self.listeners.response.invoke(&response, &origin));
                routing = Some(self.requests.handle_response(response));
            }
            Packet::Connect(_) => {}
        }

        self.publish_failures(&origin, &report);
        MessageOutcome::Dispatched {
            kind,
            report,
            routing,
        }
    }

    /// Judge a connection request. Every request ends approved or denied.
    pub fn handle_approval(&self, connection: &dyn Connection, payload: &[u8]) -> ApprovalOutcome {
        let id = connection.id();
        let remote = connection.remote_address();
        let origin = Origin::Connection(id);

        let packet = match self.deserializer.deserialize(payload) {
            Ok(packet) => packet,
            Err(error) => {
                DispatchMetrics::incr(&self.metrics.deserialization_failures);
                let reason = format!("{DESERIALIZATION_DENY_PREFIX}: {error}");
                self.errors
                    .publish(LocalError::Deserialization { origin, error });
                return self.refuse(connection, reason);
            }
        };

        let hail = match packet.into_connect() {
            Ok(hail) => hail,
            Err(error) => {
                debug!(connection = %id, error = %error, "Connection request without a hail");
                return self.refuse(connection, EXPECTED_CONNECT_REASON.to_string());
            }
        };

        let verdict = catch_unwind(AssertUnwindSafe(|| {
            self.authenticator.authenticate(&hail, remote)
        }));

        match verdict {
            Ok(Ok(AuthDecision::Accept)) => {
                if let Err(error) = connection.approve() {
                    self.errors.publish(LocalError::Transport(error.to_string()));
                    return ApprovalOutcome::TransportFailed(error);
                }
                DispatchMetrics::incr(&self.metrics.connections_approved);
                info!(connection = %id, remote = %remote, "Connection approved");

                let report = self.listeners.authenticated.invoke(&hail, &origin);
                self.publish_failures(&origin, &report);
                ApprovalOutcome::Approved
            }
            Ok(Ok(AuthDecision::Reject(reason))) => {
                let reason = if reason.is_empty() {
                    AUTH_REJECTED_REASON.to_string()
                } else {
                    reason
                };
                self.refuse(connection, reason)
            }
            Ok(Err(error)) => {
                let reason = error.to_string();
                self.errors.publish(LocalError::Authentication {
                    connection: id,
                    remote,
                    reason: reason.clone(),
                });
                self.refuse(connection, reason)
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!(
                    connection = %id,
                    remote = %remote,
                    detail = %detail,
                    "Authenticator panicked"
                );
                self.errors.publish(LocalError::Authentication {
                    connection: id,
                    remote,
                    reason: format!("{AUTHENTICATOR_PANIC_REASON}: {detail}"),
                });
                self.refuse(connection, AUTHENTICATOR_PANIC_REASON.to_string())
            }
        }
    }

    pub fn handle_status(
        &self,
        connection: ConnectionId,
        status: ConnectionStatus,
        reason: Option<String>,
    ) {
        match (&status, &reason) {
            (ConnectionStatus::Disconnected, Some(reason)) => {
                info!(connection = %connection, reason = %reason, "Connection closed")
            }
            _ => debug!(connection = %connection, status = %status, "Connection status changed"),
        }

        self.connections.update(connection, status, reason.clone());

        let origin = Origin::Connection(connection);
        let change = StatusChange {
            connection,
            status,
            reason,
        };
        let report = self.listeners.status.invoke(&change, &origin);
        self.publish_failures(&origin, &report);
    }

    /// Forward a transport diagnostic to the log; errors also go to the error channel.
    pub fn handle_diagnostic(&self, level: DiagnosticLevel, message: &str) {
        match level {
            DiagnosticLevel::Debug => debug!(source = "transport", "{message}"),
            DiagnosticLevel::Warning => warn!(source = "transport", "{message}"),
            DiagnosticLevel::Error => {
                error!(source = "transport", "{message}");
                self.errors.publish(LocalError::Transport(message.to_string()));
            }
        }
    }

    fn refuse(&self, connection: &dyn Connection, reason: String) -> ApprovalOutcome {
        DispatchMetrics::incr(&self.metrics.connections_denied);
        self.deny(connection, &reason);
        ApprovalOutcome::Denied(reason)
    }

    fn deny(&self, connection: &dyn Connection, reason: &str) {
        warn!(
            connection = %connection.id(),
            remote = %connection.remote_address(),
            reason,
            "Denying connection"
        );
        if let Err(error) = connection.deny(reason) {
            self.errors.publish(LocalError::Transport(error.to_string()));
        }
    }

    fn publish_failures(&self, origin: &Origin, report: &DispatchReport) {
        if report.is_clean() {
            return;
        }
        DispatchMetrics::add(&self.metrics.callback_failures, report.failures.len());
        for failure in &report.failures {
            self.errors.publish(LocalError::Callback {
                origin: *origin,
                failure: failure.clone(),
            });
        }
    }
}
