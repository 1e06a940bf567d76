//! Event and action types for the engine layer.
//!
//! - `Action`: instructions from a connection to the host (send bytes, emit events,
//!   queue deferred work, arm timers)
//! - `ConnectionEvent`: what the application observes on one connection

use std::time::Instant;

use bytes::Bytes;
use microtp_protocol::SequenceNumber;

/// Identifies one `write` call on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WriteId(pub u64);

/// Events a connection reports to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The handshake completed (initiator only).
    Connect,
    /// In-order bytes from the peer.
    Data(Bytes),
    /// The peer finished its write side; no more data follows.
    End,
    /// Every segment of the write has been handed to the send path.
    Written(WriteId),
    /// The peer acknowledged the final segment of the write.
    Delivered(WriteId),
    /// The connection was reset before the write was acknowledged.
    WriteFailed(WriteId),
    /// Writes blocked on backpressure have all been sent.
    Drain,
    /// A packet was retransmitted.
    Resend {
        /// Sequence number of the retransmitted packet.
        seq: SequenceNumber,
    },
    /// The connection reached its terminal state.
    Close,
}

/// Work that must run after the current unit of work, never nested inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferred {
    /// Resume writes that were blocked on backpressure.
    Drain,
}

/// Timers a connection can arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Timer {
    /// Periodic scan for packets to retransmit.
    Retransmit,
    /// End of the grace period after both directions finished.
    Teardown,
}

/// Actions that connections can request from the host.
#[derive(Debug, PartialEq)]
pub enum Action {
    /// Send the given bytes to the connection's remote address.
    Send(Vec<u8>),
    /// Emit an event to the user.
    Emit(ConnectionEvent),
    /// Run a task once the current unit of work is finished.
    Defer(Deferred),
    /// Fire a timer at the given time.
    Schedule(Timer, Instant),
}
