#![warn(missing_docs)]

//! microtp-connection: the per-connection protocol engine.
//!
//! A [`Connection`] never touches a socket or a clock. Every entry point takes the
//! current `Instant` and returns a list of [`Action`]s (datagrams to send, events to
//! emit, deferred tasks and timers) that the host executes.

/// The connection state machine.
pub mod connection;
/// Actions and events produced by the engine.
pub mod event_types;
/// Strategies for choosing connection ids.
pub mod id_allocator;
/// Connection lifecycle states.
pub mod ready_state;
/// Writes waiting for the handshake or for backpressure to clear.
pub mod write_queue;

pub use connection::{Connection, Role};
pub use event_types::{Action, ConnectionEvent, Deferred, Timer, WriteId};
pub use id_allocator::{ConnectionIdAllocator, PortIdAllocator, RandomIdAllocator};
pub use ready_state::ReadyState;
