//! Deserializer Port
//!
//! Turns a raw inbound frame into a [`Packet`].

use courier_types::{decode_packet_with_limit, Packet, PacketError};

pub trait PacketDeserializer: Send + Sync + 'static {
    fn deserialize(&self, frame: &[u8]) -> Result<Packet, PacketError>;
}

impl<F> PacketDeserializer for F
where
    F: Fn(&[u8]) -> Result<Packet, PacketError> + Send + Sync + 'static,
{
    fn deserialize(&self, frame: &[u8]) -> Result<Packet, PacketError> {
        self(frame)
    }
}

/// Reads frames written by [`courier_types::encode_packet`].
#[derive(Debug, Clone, Copy)]
pub struct BincodeDeserializer {
    max_packet_size: u64,
}

impl BincodeDeserializer {
    pub fn new(max_packet_size: u64) -> Self {
        Self { max_packet_size }
    }
}

impl Default for BincodeDeserializer {
    fn default() -> Self {
        Self::new(courier_types::DEFAULT_MAX_PACKET_SIZE)
    }
}

impl PacketDeserializer for BincodeDeserializer {
    fn deserialize(&self, frame: &[u8]) -> Result<Packet, PacketError> {
        decode_packet_with_limit(frame, self.max_packet_size)
    }
}
