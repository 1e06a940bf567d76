#![warn(missing_docs)]

//! microtp-host: UDP host, connection registry and scheduling over the connection engine.

/// Connection registry and datagram dispatch.
pub mod connection_manager;
/// Event types (ConnectionHandle, SocketEvent).
pub mod event_types;
/// Timers and deferred tasks.
pub mod scheduler;
/// High-level socket API wrapping the connection manager.
pub mod socket;
/// Time utilities for the host.
pub mod time;

pub use connection_manager::ConnectionManager;
pub use event_types::{ConnectionHandle, SocketEvent};
pub use scheduler::Scheduler;
pub use socket::Host;
