#![warn(missing_docs)]

//! microtp-protocol: wire codec, wraparound sequence arithmetic and slot buffers.

/// Packet types, header layout, encoding and decoding.
pub mod packet;
/// Wraparound-aware arithmetic on 16-bit sequence numbers.
pub mod sequence;
/// Fixed-capacity circular buffer keyed by sequence number.
pub mod slot_buffer;
/// Packet timestamps relative to a per-host epoch.
pub mod timestamp;

pub use packet::{Packet, PacketType, SequenceNumber};
pub use slot_buffer::SlotBuffer;
