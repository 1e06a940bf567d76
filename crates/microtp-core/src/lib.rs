#![warn(missing_docs)]

//! microtp-core: foundational types shared by every layer.
//!
//! This crate provides the minimal set of utilities the other crates build on:
//! - Configuration types
//! - Error handling
//! - Protocol constants
//! - The datagram transport abstraction
//!
//! Protocol logic lives in the specialized crates:
//! - `microtp-protocol`: wire codec, sequence arithmetic, slot buffers
//! - `microtp-connection`: per-connection state machine
//! - `microtp-host`: socket, connection registry and scheduling

/// Protocol constants shared across layers.
pub mod constants {
    /// Size of the fixed packet header in bytes. Shorter datagrams are malformed.
    pub const HEADER_SIZE: usize = 20;
    /// Protocol version carried in the low nibble of the first header byte.
    pub const PROTOCOL_VERSION: u8 = 1;
    /// Extension byte. Extensions are not supported, so this is always zero.
    pub const EXTENSION: u8 = 0;
    /// Receive window advertised in every packet.
    pub const DEFAULT_WINDOW_SIZE: u32 = 1 << 18;
    /// Capacity of the incoming and outgoing slot buffers. Must be a power of two.
    pub const DEFAULT_BUFFER_SIZE: u16 = 512;
    /// Largest payload carried by a single DATA packet.
    ///
    /// Derived from ethernet_mtu - ipv6_header_size - udp_header_size - packet header size,
    /// rounded down: 1400 < 1500 - 40 - 8 - 20.
    pub const DEFAULT_MAX_SEGMENT_SIZE: usize = 1400;
    /// Largest datagram we can ever receive.
    pub const MAX_DATAGRAM_SIZE: usize = 65_535;
}

/// Configuration options for the protocol and runtime.
pub mod config;
/// Error types and results.
pub mod error;
/// Transport abstraction for pluggable I/O.
pub mod transport;
