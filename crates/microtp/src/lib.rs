#![warn(missing_docs)]

//! microtp: reliable, ordered byte streams over UDP.
//!
//! This crate re-exports the surface needed by applications:
//!
//! - Host and events (`Host`, `SocketEvent`, `ConnectionHandle`)
//! - Write tracking and connection state (`WriteId`, `ReadyState`)
//! - Core configuration and errors (`Config`, `ErrorKind`)
//! - The wire format (`Packet`, `PacketType`) for tooling and tests
//!
//! Example
//! ```no_run
//! use std::time::Instant;
//!
//! use microtp::{Host, SocketEvent};
//!
//! let (mut host, handle) = Host::connect("127.0.0.1:9000").unwrap();
//! host.write(handle, &b"hello"[..]).unwrap();
//! host.end(handle).unwrap();
//!
//! while host.is_open() {
//!     host.manual_poll(Instant::now());
//!     while let Some(event) = host.recv() {
//!         if let SocketEvent::Data(_, bytes) = event {
//!             println!("{}", String::from_utf8_lossy(&bytes));
//!         }
//!     }
//! }
//! ```

// Core config and errors
pub use microtp_core::{
    config::Config,
    error::{ErrorKind, Result},
};
// Connection engine types surfaced through events and queries
pub use microtp_connection::{
    ConnectionIdAllocator, PortIdAllocator, RandomIdAllocator, ReadyState, WriteId,
};
// Host: owns the socket and every connection on it
pub use microtp_host::{ConnectionHandle, Host, SocketEvent};
// Protocol: wire format
pub use microtp_protocol::{Packet, PacketType};

/// Convenience prelude with the most commonly used items.
pub mod prelude {
    pub use crate::{Config, ConnectionHandle, ErrorKind, Host, ReadyState, SocketEvent, WriteId};
}
