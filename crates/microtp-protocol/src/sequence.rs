//! All sequence and acknowledgment numbers live in a 16-bit ring. Never compare
//! them with `<`/`>` directly.

use crate::packet::SequenceNumber;

/// Forward distance from `from` to `to` around the ring.
#[inline]
pub fn sequence_distance(from: SequenceNumber, to: SequenceNumber) -> u16 {
    to.wrapping_sub(from)
}

/// Compares sequence numbers with wrapping arithmetic.
pub fn sequence_greater_than(s1: SequenceNumber, s2: SequenceNumber) -> bool {
    ((s1 > s2) && (s1 - s2 <= 32768)) || ((s1 < s2) && (s2 - s1 > 32768))
}

/// Compares sequence numbers with wrapping arithmetic.
pub fn sequence_less_than(s1: SequenceNumber, s2: SequenceNumber) -> bool {
    sequence_greater_than(s2, s1)
}

/// Returns true when `seq` lies `capacity` or more positions past `ack`, or
/// is `ack` itself. Such packets are never buffered.
pub fn is_outside_window(ack: SequenceNumber, seq: SequenceNumber, capacity: u16) -> bool {
    let distance = sequence_distance(ack, seq);
    distance == 0 || distance >= capacity
}
