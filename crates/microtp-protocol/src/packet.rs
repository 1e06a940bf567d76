//! Packet types and the fixed 20-byte header codec.
//!
//! Layout (big-endian):
//!
//! ```text
//! 0       1       2               4               8
//! +-------+-------+---------------+---------------+
//! |type|ver| ext  | connection id |   timestamp   |
//! +-------+-------+---------------+---------------+
//! 8               12              16      18      20
//! +---------------+---------------+-------+-------+
//! |   timediff    |    window     |  seq  |  ack  |
//! +---------------+---------------+-------+-------+
//! ```
//!
//! Anything after byte 20 is payload. Decoding only checks the length; semantic
//! validation is left to the connection engine.

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};
use bytes::{BufMut, Bytes};
use microtp_core::{
    constants::{DEFAULT_WINDOW_SIZE, EXTENSION, HEADER_SIZE, PROTOCOL_VERSION},
    error::{ErrorKind, Result},
};

/// 16-bit sequence number type used by protocol.
pub type SequenceNumber = u16;

/// Id to identify a certain packet type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Carries payload.
    Data,
    /// Graceful close of the sender's write side.
    Fin,
    /// Bare acknowledgment.
    State,
    /// Abrupt close.
    Reset,
    /// Handshake initiation.
    Syn,
    /// A type nibble this implementation does not know; kept verbatim.
    Other(u8),
}

impl PacketType {
    /// Returns the 4-bit wire value.
    pub fn to_u8(&self) -> u8 {
        match self {
            PacketType::Data => 0,
            PacketType::Fin => 1,
            PacketType::State => 2,
            PacketType::Reset => 3,
            PacketType::Syn => 4,
            PacketType::Other(value) => *value & 0x0f,
        }
    }
}

impl From<u8> for PacketType {
    fn from(value: u8) -> Self {
        match value {
            0 => PacketType::Data,
            1 => PacketType::Fin,
            2 => PacketType::State,
            3 => PacketType::Reset,
            4 => PacketType::Syn,
            other => PacketType::Other(other),
        }
    }
}

/// A decoded packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    /// Packet type.
    pub kind: PacketType,
    /// Connection id; SYN carries the sender's receive id, everything else the
    /// receiver's id.
    pub connection_id: u16,
    /// Microseconds since the sender's epoch, wrapping.
    pub timestamp: u32,
    /// Reserved, always zero.
    pub timediff: u32,
    /// Advertised receive window.
    pub window: u32,
    /// Sequence number of this packet.
    pub seq: SequenceNumber,
    /// Last sequence number the sender has received contiguously.
    pub ack: SequenceNumber,
    /// Optional payload; `None` when nothing follows the header.
    pub payload: Option<Bytes>,
}

impl Packet {
    /// Creates a packet with the default window and no timediff.
    pub fn new(
        kind: PacketType,
        connection_id: u16,
        seq: SequenceNumber,
        ack: SequenceNumber,
        timestamp: u32,
        payload: Option<Bytes>,
    ) -> Self {
        Self {
            kind,
            connection_id,
            timestamp,
            timediff: 0,
            window: DEFAULT_WINDOW_SIZE,
            seq,
            ack,
            payload: payload.filter(|payload| !payload.is_empty()),
        }
    }

    /// Length of the payload in bytes.
    pub fn payload_len(&self) -> usize {
        self.payload.as_ref().map_or(0, Bytes::len)
    }

    /// Size of the encoded packet in bytes.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload_len()
    }

    /// Appends the encoded packet to `buf`.
    pub fn encode_into<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.kind.to_u8() << 4 | PROTOCOL_VERSION);
        buf.put_u8(EXTENSION);
        buf.put_u16(self.connection_id);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.timediff);
        buf.put_u32(self.window);
        buf.put_u16(self.seq);
        buf.put_u16(self.ack);
        if let Some(payload) = &self.payload {
            buf.put_slice(payload);
        }
    }

    /// Encodes the packet into a fresh buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buffer);
        buffer
    }

    /// Decodes a datagram. Fails only when it is shorter than the header.
    pub fn decode(data: &[u8]) -> Result<Packet> {
        if data.len() < HEADER_SIZE {
            return Err(ErrorKind::ReceivedDataToShort);
        }

        let mut cursor = Cursor::new(data);
        let kind = PacketType::from(cursor.read_u8()? >> 4);
        let _extension = cursor.read_u8()?;
        let connection_id = cursor.read_u16::<BigEndian>()?;
        let timestamp = cursor.read_u32::<BigEndian>()?;
        let timediff = cursor.read_u32::<BigEndian>()?;
        let window = cursor.read_u32::<BigEndian>()?;
        let seq = cursor.read_u16::<BigEndian>()?;
        let ack = cursor.read_u16::<BigEndian>()?;

        let payload = if data.len() > HEADER_SIZE {
            Some(Bytes::copy_from_slice(&data[HEADER_SIZE..]))
        } else {
            None
        };

        Ok(Packet { kind, connection_id, timestamp, timediff, window, seq, ack, payload })
    }
}
