//! # Typed Messages
//!
//! Application payloads implement [`Message`] to get a stable type name and a
//! bincode encoding. Requests additionally name the message type they expect
//! back through [`RequestMessage::Response`].

use crate::errors::PacketError;
use crate::packet::PacketType;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A concrete message that can ride inside a packet payload.
pub trait Message: Serialize + DeserializeOwned + Send + 'static {
    /// Stable name identifying this message type on the wire.
    const TYPE: &'static str;

    /// The [`PacketType`] for this message.
    fn packet_type() -> PacketType {
        PacketType::new(Self::TYPE)
    }

    /// Encode this message as a packet payload.
    fn encode(&self) -> Result<Vec<u8>, PacketError> {
        bincode::serialize(self).map_err(|e| PacketError::Encode(e.to_string()))
    }

    /// Decode a packet payload into this message.
    fn decode(payload: &[u8]) -> Result<Self, PacketError> {
        bincode::deserialize(payload).map_err(|e| PacketError::Decode(e.to_string()))
    }
}

/// A message sent as a request, answered by a `Response` message.
pub trait RequestMessage: Message {
    /// The message type a peer must answer with.
    type Response: Message;
}
