//! Transport abstraction for pluggable I/O.

use std::{io::Result, net::SocketAddr};

/// Unreliable datagram endpoint the protocol runs on.
///
/// The host only needs to push buffers to an address and pull buffers together with the
/// sender's address, so UDP sockets, in-memory links and lossy test harnesses can all be
/// plugged in without touching the protocol engine.
pub trait DatagramSocket {
    /// Sends one datagram to `addr`.
    fn send_to(&mut self, addr: &SocketAddr, payload: &[u8]) -> Result<usize>;

    /// Receives one datagram into `buffer`, returning the filled part and its sender.
    ///
    /// Non-blocking sockets report `WouldBlock` when nothing is queued.
    fn recv_from<'a>(&mut self, buffer: &'a mut [u8]) -> Result<(&'a [u8], SocketAddr)>;

    /// Returns the local address the endpoint is bound to.
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Returns whether receiving blocks until a datagram arrives.
    fn is_blocking_mode(&self) -> bool;
}
