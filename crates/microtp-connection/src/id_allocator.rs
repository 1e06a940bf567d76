use std::{fmt::Debug, net::SocketAddr};

use rand::Rng;

/// Chooses the receive id of a connection we initiate.
///
/// The send id is always the receive id plus one. Nothing coordinates ids across
/// hosts, so two initiators behind the same address can still collide.
pub trait ConnectionIdAllocator: Debug + Send {
    /// Returns the receive id for a connection bound to `local_addr`.
    fn allocate(&mut self, local_addr: SocketAddr) -> u16;
}

/// Uses the local port, which the OS keeps unique per host for as long as the
/// socket is bound.
#[derive(Debug, Default, Clone, Copy)]
pub struct PortIdAllocator;

impl ConnectionIdAllocator for PortIdAllocator {
    fn allocate(&mut self, local_addr: SocketAddr) -> u16 {
        local_addr.port()
    }
}

/// Picks a random id.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdAllocator;

impl ConnectionIdAllocator for RandomIdAllocator {
    fn allocate(&mut self, _local_addr: SocketAddr) -> u16 {
        rand::rng().random()
    }
}
