//! Event types for the host layer.
//!
//! - `ConnectionHandle`: stable key of a connection in the registry
//! - `SocketEvent`: what the application receives from a `Host`

use std::{
    fmt,
    net::{IpAddr, SocketAddr},
};

use bytes::Bytes;
use microtp_connection::{ConnectionEvent, WriteId};
use microtp_protocol::SequenceNumber;

/// Identifies a connection: the peer's IP and our receive id.
///
/// The peer's port is deliberately not part of the key; it is tracked on the
/// connection and updated from every datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle {
    /// Peer IP address.
    pub ip: IpAddr,
    /// Our receive id for this connection.
    pub id: u16,
}

impl ConnectionHandle {
    /// Creates a handle.
    pub fn new(ip: IpAddr, id: u16) -> Self {
        Self { ip, id }
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.ip, self.id)
    }
}

/// Events that can occur and are pushed through the event_receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A listening host is bound and ready.
    Listening(SocketAddr),
    /// A peer opened a connection to a listening host.
    Connection(ConnectionHandle, SocketAddr),
    /// Our connection attempt was answered.
    Connect(ConnectionHandle),
    /// In-order bytes from the peer.
    Data(ConnectionHandle, Bytes),
    /// The peer finished sending.
    End(ConnectionHandle),
    /// A write was fully handed to the send path.
    Written(ConnectionHandle, WriteId),
    /// A write was acknowledged by the peer.
    Delivered(ConnectionHandle, WriteId),
    /// A write will never be acknowledged because the connection was reset.
    WriteFailed(ConnectionHandle, WriteId),
    /// Writes held back by backpressure have been sent.
    Drain(ConnectionHandle),
    /// A packet was retransmitted.
    Resend {
        /// Connection that retransmitted.
        handle: ConnectionHandle,
        /// Sequence number of the packet.
        seq: SequenceNumber,
    },
    /// The connection is gone from the registry.
    Close(ConnectionHandle),
    /// The host's socket was closed after its initiating connection closed.
    SocketClosed,
    /// A socket operation failed.
    Error(Option<ConnectionHandle>, String),
}

impl SocketEvent {
    /// Tags an engine event with the connection it came from.
    pub fn from_connection(handle: ConnectionHandle, event: ConnectionEvent) -> Self {
        match event {
            ConnectionEvent::Connect => SocketEvent::Connect(handle),
            ConnectionEvent::Data(bytes) => SocketEvent::Data(handle, bytes),
            ConnectionEvent::End => SocketEvent::End(handle),
            ConnectionEvent::Written(id) => SocketEvent::Written(handle, id),
            ConnectionEvent::Delivered(id) => SocketEvent::Delivered(handle, id),
            ConnectionEvent::WriteFailed(id) => SocketEvent::WriteFailed(handle, id),
            ConnectionEvent::Drain => SocketEvent::Drain(handle),
            ConnectionEvent::Resend { seq } => SocketEvent::Resend { handle, seq },
            ConnectionEvent::Close => SocketEvent::Close(handle),
        }
    }

    /// Returns the connection the event belongs to, if any.
    pub fn handle(&self) -> Option<ConnectionHandle> {
        match self {
            SocketEvent::Connection(handle, _)
            | SocketEvent::Connect(handle)
            | SocketEvent::Data(handle, _)
            | SocketEvent::End(handle)
            | SocketEvent::Written(handle, _)
            | SocketEvent::Delivered(handle, _)
            | SocketEvent::WriteFailed(handle, _)
            | SocketEvent::Drain(handle)
            | SocketEvent::Resend { handle, .. }
            | SocketEvent::Close(handle) => Some(*handle),
            SocketEvent::Error(handle, _) => *handle,
            SocketEvent::Listening(_) | SocketEvent::SocketClosed => None,
        }
    }
}
