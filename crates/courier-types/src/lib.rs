//! # Courier Types
//!
//! The packet model every Courier crate builds on.
//!
//! ## Packet Kinds
//!
//! ```text
//! Packet ─┬─ Data      (fire-and-forget message)
//!         ├─ Request   (identifier + expected response type)
//!         ├─ Response  (correlation id == request identifier)
//!         └─ Connect   (hail used for connection approval)
//! ```
//!
//! The [`PacketKind`] discriminator drives dispatch. The [`PacketType`] names
//! the concrete message carried in the payload, so a `"ping"` request can
//! declare that it expects a `"pong"` response.
//!
//! ## Identity
//!
//! Request identifiers come from a per-peer [`RequestIdGenerator`]: a
//! monotonically increasing 64-bit counter. Two outstanding requests of the
//! same peer can never share an identifier.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod codec;
pub mod errors;
pub mod ids;
pub mod message;
pub mod packet;

pub use codec::{decode_packet, decode_packet_with_limit, encode_packet};
pub use errors::PacketError;
pub use ids::{ConnectionId, Origin, RequestId, RequestIdGenerator};
pub use message::{Message, RequestMessage};
pub use packet::{
    ConnectPacket, DataPacket, Packet, PacketKind, PacketType, RequestPacket, ResponsePacket,
};

/// Wire format version, bumped on any incompatible change to [`Packet`].
pub const WIRE_VERSION: u16 = 1;

/// Largest encoded packet accepted by [`decode_packet`] (1 MiB).
pub const DEFAULT_MAX_PACKET_SIZE: u64 = 1024 * 1024;
