//! # Packets
//!
//! The four concrete packets and the [`Packet`] enum that carries them.
//! Packets are immutable once built: fields are private and only readable
//! through accessors. The one mutation, assigning a request identifier, consumes
//! the request and returns a new one.

use crate::errors::PacketError;
use crate::ids::RequestId;
use crate::message::{Message, RequestMessage};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// DISCRIMINATORS
// =============================================================================

/// Category of a packet, used as the dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketKind {
    Data,
    Request,
    Response,
    Connect,
}

impl PacketKind {
    /// All kinds, in declaration order.
    pub const ALL: [PacketKind; 4] = [
        PacketKind::Data,
        PacketKind::Request,
        PacketKind::Response,
        PacketKind::Connect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PacketKind::Data => "data",
            PacketKind::Request => "request",
            PacketKind::Response => "response",
            PacketKind::Connect => "connect",
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of the concrete message type carried by a packet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PacketType(String);

impl PacketType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this names the message type `M`.
    pub fn is<M: Message>(&self) -> bool {
        self.0 == M::TYPE
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PacketType {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl PartialEq<str> for PacketType {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PacketType {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

fn decode_as<M: Message>(packet_type: &PacketType, payload: &[u8]) -> Result<M, PacketError> {
    if !packet_type.is::<M>() {
        return Err(PacketError::UnexpectedType {
            expected: M::packet_type(),
            actual: packet_type.clone(),
        });
    }
    M::decode(payload)
}

// =============================================================================
// CONCRETE PACKETS
// =============================================================================

/// A fire-and-forget message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPacket {
    packet_type: PacketType,
    payload: Vec<u8>,
}

impl DataPacket {
    pub fn new(packet_type: impl Into<PacketType>, payload: Vec<u8>) -> Self {
        Self {
            packet_type: packet_type.into(),
            payload,
        }
    }

    /// Wrap a typed message.
    pub fn from_message<M: Message>(message: &M) -> Result<Self, PacketError> {
        Ok(Self::new(M::packet_type(), message.encode()?))
    }

    pub fn packet_type(&self) -> &PacketType {
        &self.packet_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Decode the payload as `M`, checking the type name first.
    pub fn decode<M: Message>(&self) -> Result<M, PacketError> {
        decode_as(&self.packet_type, &self.payload)
    }
}

/// A message that expects a response of `response_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPacket {
    identifier: Option<RequestId>,
    packet_type: PacketType,
    response_type: PacketType,
    payload: Vec<u8>,
}

impl RequestPacket {
    /// Build an unidentified request; the request registry assigns the id.
    pub fn new(
        packet_type: impl Into<PacketType>,
        response_type: impl Into<PacketType>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            identifier: None,
            packet_type: packet_type.into(),
            response_type: response_type.into(),
            payload,
        }
    }

    /// Wrap a typed request; the expected response type comes from `Q::Response`.
    pub fn from_message<Q: RequestMessage>(message: &Q) -> Result<Self, PacketError> {
        Ok(Self::new(
            Q::packet_type(),
            <Q::Response as Message>::packet_type(),
            message.encode()?,
        ))
    }

    /// Return this request carrying `id`.
    pub fn with_identifier(mut self, id: RequestId) -> Self {
        self.identifier = Some(id);
        self
    }

    pub fn identifier(&self) -> Option<RequestId> {
        self.identifier
    }

    pub fn packet_type(&self) -> &PacketType {
        &self.packet_type
    }

    /// The message type the sender expects back.
    pub fn response_type(&self) -> &PacketType {
        &self.response_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn decode<M: Message>(&self) -> Result<M, PacketError> {
        decode_as(&self.packet_type, &self.payload)
    }

    /// Build the response answering this request.
    ///
    /// Fails if the request was never identified or `M` is not the declared
    /// response type.
    pub fn respond_with<M: Message>(&self, message: &M) -> Result<ResponsePacket, PacketError> {
        let correlation_id = self.identifier.ok_or(PacketError::MissingIdentifier)?;
        if !self.response_type.is::<M>() {
            return Err(PacketError::UnexpectedType {
                expected: self.response_type.clone(),
                actual: M::packet_type(),
            });
        }
        Ok(ResponsePacket::new(
            correlation_id,
            M::packet_type(),
            message.encode()?,
        ))
    }
}

/// The answer to a request, matched by `correlation_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsePacket {
    correlation_id: RequestId,
    packet_type: PacketType,
    payload: Vec<u8>,
}

impl ResponsePacket {
    pub fn new(
        correlation_id: RequestId,
        packet_type: impl Into<PacketType>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            correlation_id,
            packet_type: packet_type.into(),
            payload,
        }
    }

    pub fn correlation_id(&self) -> RequestId {
        self.correlation_id
    }

    pub fn packet_type(&self) -> &PacketType {
        &self.packet_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn decode<M: Message>(&self) -> Result<M, PacketError> {
        decode_as(&self.packet_type, &self.payload)
    }
}

/// Hail sent while opening a connection; checked by the remote's authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectPacket {
    credential: String,
    payload: Vec<u8>,
}

impl ConnectPacket {
    pub fn new(credential: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
            payload: Vec::new(),
        }
    }

    /// Attach application data to the hail.
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

// =============================================================================
// PACKET ENUM
// =============================================================================

/// Any packet that can cross the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packet {
    Data(DataPacket),
    Request(RequestPacket),
    Response(ResponsePacket),
    Connect(ConnectPacket),
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Data(_) => PacketKind::Data,
            Packet::Request(_) => PacketKind::Request,
            Packet::Response(_) => PacketKind::Response,
            Packet::Connect(_) => PacketKind::Connect,
        }
    }

    /// Concrete message type; connect packets have none.
    pub fn packet_type(&self) -> Option<&PacketType> {
        match self {
            Packet::Data(p) => Some(p.packet_type()),
            Packet::Request(p) => Some(p.packet_type()),
            Packet::Response(p) => Some(p.packet_type()),
            Packet::Connect(_) => None,
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            Packet::Data(p) => p.payload(),
            Packet::Request(p) => p.payload(),
            Packet::Response(p) => p.payload(),
            Packet::Connect(p) => p.payload(),
        }
    }

    /// Unwrap a connect packet, or report which kind arrived instead.
    pub fn into_connect(self) -> Result<ConnectPacket, PacketError> {
        match self {
            Packet::Connect(connect) => Ok(connect),
            other => Err(PacketError::UnexpectedKind {
                expected: PacketKind::Connect,
                actual: other.kind(),
            }),
        }
    }
}

impl From<DataPacket> for Packet {
    fn from(packet: DataPacket) -> Self {
        Packet::Data(packet)
    }
}

impl From<RequestPacket> for Packet {
    fn from(packet: RequestPacket) -> Self {
        Packet::Request(packet)
    }
}

impl From<ResponsePacket> for Packet {
    fn from(packet: ResponsePacket) -> Self {
        Packet::Response(packet)
    }
}

impl From<ConnectPacket> for Packet {
    fn from(packet: ConnectPacket) -> Self {
        Packet::Connect(packet)
    }
}
