//! # Wire Codec
//!
//! Packets travel as a bincode frame: a `u16` wire version followed by the
//! serde encoding of [`Packet`]. Decoding is bounded so a hostile length
//! prefix cannot force a large allocation.

use crate::errors::PacketError;
use crate::packet::Packet;
use crate::{DEFAULT_MAX_PACKET_SIZE, WIRE_VERSION};
use bincode::Options;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct FrameRef<'a> {
    version: u16,
    packet: &'a Packet,
}

#[derive(Deserialize)]
struct Frame {
    version: u16,
    packet: Packet,
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Encode a packet into a wire frame.
pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, PacketError> {
    let frame = FrameRef {
        version: WIRE_VERSION,
        packet,
    };
    wire_options()
        .serialize(&frame)
        .map_err(|e| PacketError::Encode(e.to_string()))
}

/// Decode a wire frame using [`DEFAULT_MAX_PACKET_SIZE`].
pub fn decode_packet(bytes: &[u8]) -> Result<Packet, PacketError> {
    decode_packet_with_limit(bytes, DEFAULT_MAX_PACKET_SIZE)
}

/// Decode a wire frame no larger than `limit` bytes.
pub fn decode_packet_with_limit(bytes: &[u8], limit: u64) -> Result<Packet, PacketError> {
    if bytes.len() as u64 > limit {
        return Err(PacketError::TooLarge { limit });
    }

    let frame: Frame = wire_options()
        .with_limit(limit)
        .deserialize(bytes)
        .map_err(|e| PacketError::Decode(e.to_string()))?;

    if frame.version != WIRE_VERSION {
        return Err(PacketError::UnsupportedVersion {
            received: frame.version,
            supported: WIRE_VERSION,
        });
    }

    Ok(frame.packet)
}
