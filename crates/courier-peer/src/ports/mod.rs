//! Ports Layer
//!
//! Traits for what the peer depends on but does not implement:
//! - `Transport` / `Connection` - the network underneath
//! - `Authenticator` - judging connecting remotes
//! - `PacketDeserializer` - decoding raw frames

pub mod auth;
pub mod deserializer;
pub mod transport;

pub use auth::{
    AuthDecision, AuthError, Authenticator, CredentialAuthenticator, StaticAuthenticator,
    AUTH_REJECTED_REASON,
};
pub use deserializer::{BincodeDeserializer, PacketDeserializer};
pub use transport::{
    Connection, ConnectionStatus, Destination, DiagnosticLevel, InboundMessage, Transport,
    TransportError, TransportEvent,
};
