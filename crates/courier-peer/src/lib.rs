//! # Courier Peer - Dispatch Orchestrator
//!
//! Sits between a transport and the application.
//!
//! ## Architecture
//!
//! ```text
//!  ┌───────────────┐ TransportEvent ┌──────────────────────────────────────┐
//!  │  Transport    │───────────────→│ Dispatcher                           │
//!  │  (port)       │                │  deserialize → listeners → registry  │
//!  │               │←───────────────│  approve / deny                      │
//!  └───────────────┘  frames        └──────────────┬───────────────────────┘
//!          ↑                                       │
//!          │ send / connect                        ↓
//!  ┌───────┴───────────────────────────┐   ┌───────────────┐
//!  │ Peer                              │   │ ErrorChannel  │
//!  │  send · request · serve · connect │   │ (local faults)│
//!  └───────────────────────────────────┘   └───────────────┘
//! ```
//!
//! The transport, the authenticator and the deserializer are ports; the
//! crate ships an in-memory transport in [`adapters`].
//!
//! ## Fault Handling
//!
//! The delivery loop never fails. Undecodable frames deny the connection they
//! arrived on, refused hails are denied with a reason, and failing callbacks
//! are isolated. All of it is published on the [`ErrorChannel`].

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod config;
pub mod connections;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod listeners;
pub mod metrics;
pub mod peer;
pub mod ports;

pub use adapters::{MemoryHub, MemoryTransport};
pub use config::{ConfigError, DeliveryMethod, DeliveryOptions, PeerConfig};
pub use connections::{ConnectionState, ConnectionTable};
pub use dispatcher::{ApprovalOutcome, Dispatcher, MessageOutcome};
pub use error::PeerError;
pub use events::{ErrorChannel, LocalError};
pub use listeners::{PeerListeners, StatusChange};
pub use metrics::{DispatchMetrics, DispatchStats};
pub use peer::{Peer, PeerBuilder, PeerStats};
pub use ports::{
    AuthDecision, AuthError, Authenticator, BincodeDeserializer, Connection, ConnectionStatus,
    CredentialAuthenticator, Destination, DiagnosticLevel, InboundMessage, PacketDeserializer,
    StaticAuthenticator, Transport, TransportError, TransportEvent,
};
