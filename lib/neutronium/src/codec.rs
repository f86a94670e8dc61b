//! Fixed 14-byte header + opaque payload packet codec (spec §4.2).
//! Manual little-endian byteorder framing, grounded on
//! `lib/neutronium/src/net/frame.rs` (discriminated header, `Category`
//! enum) and `lib/flux/src/contract.rs` (fixed-field read/write style).
//! Deliberately not `serde`/`bincode`: the header is a fixed wire
//! contract consumed by non-Rust peers (the Unity client, out of scope).

use crate::pool::{BufferPool, PooledBuffer, Poolable};
use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// Header size in bytes (spec §3 "header is exactly 14 bytes").
pub const HEADER_SIZE: usize = 14;

/// Conservative cap keeping `14 + payload_size` under typical MTU.
pub const MAX_PACKET_SIZE: usize = 1400;
pub const MAX_PAYLOAD_SIZE: usize = MAX_PACKET_SIZE - HEADER_SIZE;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum ChannelType {
    Reliable = 0,
    Unreliable = 1,
    Sequenced = 2,
}

impl ChannelType {
    fn from_u8(v: u8) -> Result<ChannelType, CodecError> {
        match v {
            0 => Ok(ChannelType::Reliable),
            1 => Ok(ChannelType::Unreliable),
            2 => Ok(ChannelType::Sequenced),
            _ => Err(CodecError::MalformedPacket),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum PacketType {
    Handshake = 0,
    HandshakeAck = 1,
    Ping = 2,
    Pong = 3,
    Data = 4,
    Disconnect = 5,
}

impl PacketType {
    fn from_u8(v: u8) -> Result<PacketType, CodecError> {
        match v {
            0 => Ok(PacketType::Handshake),
            1 => Ok(PacketType::HandshakeAck),
            2 => Ok(PacketType::Ping),
            3 => Ok(PacketType::Pong),
            4 => Ok(PacketType::Data),
            5 => Ok(PacketType::Disconnect),
            _ => Err(CodecError::MalformedPacket),
        }
    }
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum CodecError {
    #[error("malformed packet")]
    MalformedPacket,
}

/// The universal wire envelope (spec §3). Does not own its payload
/// buffer — whoever assigned `payload` is responsible for its lifetime
/// (spec §9 "Cyclic and back references").
pub struct Packet {
    pub packet_type: PacketType,
    pub sequence: u16,
    pub ack: u16,
    pub ack_bits: u32,
    pub channel: ChannelType,
    pub payload: PooledBuffer,
}

impl Poolable for Packet {
    fn new() -> Self {
        Packet {
            packet_type: PacketType::Data,
            sequence: 0,
            ack: 0,
            ack_bits: 0,
            channel: ChannelType::Unreliable,
            payload: PooledBuffer::unpooled(Vec::new()),
        }
    }

    fn reset(&mut self) {
        self.packet_type = PacketType::Data;
        self.sequence = 0;
        self.ack = 0;
        self.ack_bits = 0;
        self.channel = ChannelType::Unreliable;
        self.payload = PooledBuffer::unpooled(Vec::new());
    }
}

impl Packet {
    /// Encode the packet into `out`: `[type:1][sequence:2][ack:2][ack_bits:4][channel:1][payload_size:4]`
    /// followed by the payload bytes (spec §4.2).
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.clear();
        out.resize(HEADER_SIZE + self.payload.len(), 0);

        out[0] = self.packet_type as u8;
        LittleEndian::write_u16(&mut out[1..3], self.sequence);
        LittleEndian::write_u16(&mut out[3..5], self.ack);
        LittleEndian::write_u32(&mut out[5..9], self.ack_bits);
        out[9] = self.channel as u8;
        LittleEndian::write_u32(&mut out[10..14], self.payload.len() as u32);
        out[HEADER_SIZE..].copy_from_slice(&self.payload);
    }

    /// Decode a packet from `input`, reusing `buffer_pool` for the payload.
    /// Fails with `MalformedPacket` if the input is shorter than
    /// `HEADER_SIZE`, or `14 + payload_size` exceeds the input length.
    pub fn decode(input: &[u8], buffer_pool: &BufferPool) -> Result<Packet, CodecError> {
        if input.len() < HEADER_SIZE {
            return Err(CodecError::MalformedPacket);
        }

        let packet_type = PacketType::from_u8(input[0])?;
        let sequence = LittleEndian::read_u16(&input[1..3]);
        let ack = LittleEndian::read_u16(&input[3..5]);
        let ack_bits = LittleEndian::read_u32(&input[5..9]);
        let channel = ChannelType::from_u8(input[9])?;
        let payload_size = LittleEndian::read_u32(&input[10..14]) as usize;

        if HEADER_SIZE + payload_size > input.len() {
            return Err(CodecError::MalformedPacket);
        }

        let mut payload = buffer_pool.rent(payload_size);
        payload.copy_from_slice(&input[HEADER_SIZE..HEADER_SIZE + payload_size]);

        Ok(Packet {
            packet_type,
            sequence,
            ack,
            ack_bits,
            channel,
            payload,
        })
    }

    /// `seq == ack`, or `1 <= ack - seq <= 32` and the corresponding bit
    /// of `ack_bits` is set (spec §4.2).
    pub fn is_acked(&self, seq: u16) -> bool {
        if seq == self.ack {
            return true;
        }
        let distance = self.ack.wrapping_sub(seq);
        if distance == 0 || distance > 32 {
            return false;
        }
        (self.ack_bits & (1 << (distance - 1))) != 0
    }

    /// Advance the ack window with a newly observed `seq` (spec §4.2).
    pub fn mark_acked(&mut self, seq: u16) {
        if is_newer(seq, self.ack) {
            let shift = seq.wrapping_sub(self.ack) as u32;
            // Bit `i` acknowledges `ack - (i+1)`; sliding the window forward
            // by `shift` moves every existing bit up by `shift` positions,
            // and the *former* ack now sits at bit `shift - 1`.
            self.ack_bits = if shift >= 32 {
                0
            } else {
                (self.ack_bits << shift) | (1 << (shift - 1))
            };
            self.ack = seq;
        } else {
            let distance = self.ack.wrapping_sub(seq);
            if distance >= 1 && distance <= 32 {
                self.ack_bits |= 1 << (distance - 1);
            }
        }
    }
}

/// 16-bit wrap-aware "is newer than" comparison (spec §4.2).
pub fn is_newer(s1: u16, s2: u16) -> bool {
    let diff = s1.wrapping_sub(s2);
    diff != 0 && diff <= 32768
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(payload: &[u8]) -> Packet {
        Packet {
            packet_type: PacketType::Data,
            sequence: 7,
            ack: 3,
            ack_bits: 0b101,
            channel: ChannelType::Reliable,
            payload: PooledBuffer::unpooled(payload.to_vec()),
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let pool = BufferPool::new();
        let original = packet(b"hello world");
        let mut buf = Vec::new();
        original.encode(&mut buf);

        let decoded = Packet::decode(&buf, &pool).unwrap();
        assert_eq!(decoded.packet_type, PacketType::Data);
        assert_eq!(decoded.sequence, 7);
        assert_eq!(decoded.ack, 3);
        assert_eq!(decoded.ack_bits, 0b101);
        assert_eq!(decoded.channel, ChannelType::Reliable);
        assert_eq!(&decoded.payload[..], b"hello world");
    }

    #[test]
    fn decode_rejects_short_input() {
        let pool = BufferPool::new();
        let buf = vec![0u8; HEADER_SIZE - 1];
        assert_eq!(Packet::decode(&buf, &pool), Err(CodecError::MalformedPacket));
    }

    #[test]
    fn decode_rejects_inconsistent_payload_size() {
        let pool = BufferPool::new();
        let mut buf = vec![0u8; HEADER_SIZE];
        LittleEndian::write_u32(&mut buf[10..14], 1000);
        assert_eq!(Packet::decode(&buf, &pool), Err(CodecError::MalformedPacket));
    }

    #[test]
    fn is_newer_is_antisymmetric() {
        assert!(is_newer(10, 5));
        assert!(!is_newer(5, 10));
        assert!(!is_newer(5, 5));
        // Wraparound.
        assert!(is_newer(1, 65535));
        assert!(!is_newer(65535, 1));
    }

    #[test]
    fn mark_acked_then_is_acked() {
        let mut p = packet(b"");
        p.ack = 10;
        p.ack_bits = 0;

        p.mark_acked(11);
        assert_eq!(p.ack, 11);
        assert!(p.is_acked(11));
        assert!(p.is_acked(10));

        p.mark_acked(8); // older, out-of-order arrival
        assert_eq!(p.ack, 11);
        assert!(p.is_acked(8));
    }
}
