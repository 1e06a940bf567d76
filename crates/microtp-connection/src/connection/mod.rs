//! Per-connection state machine.
//!
//! The engine is split by concern:
//! - `receive`: inbound packets, in-order draining and the acknowledgment algorithm
//! - `send`: packet construction, retention and retransmission
//! - `writer`: the write path (segmentation, backpressure, FIN) and close sequencing

use std::{collections::VecDeque, net::SocketAddr, time::Instant};

use bytes::Bytes;
use microtp_core::config::Config;
use microtp_protocol::{Packet, PacketType, SequenceNumber, SlotBuffer};
use rand::Rng;
use tracing::debug;

use crate::{
    event_types::{Action, ConnectionEvent, Timer, WriteId},
    ready_state::ReadyState,
    write_queue::WriteQueue,
};

mod receive;
mod send;
mod writer;

/// Which side opened the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sent the SYN and owns its socket.
    Initiator,
    /// Built from a received SYN on a shared listening socket.
    Responder,
}

/// What to report once an outgoing packet is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// Final segment of a write.
    Write(WriteId),
    /// Our FIN.
    Fin,
}

/// A sent packet kept for retransmission until acknowledged.
#[derive(Debug)]
pub(crate) struct OutgoingPacket {
    pub(crate) packet: Packet,
    pub(crate) sent_at: Instant,
    pub(crate) delivery: Option<Delivery>,
}

/// Data held back while the readable side is paused.
#[derive(Debug)]
enum Readable {
    Data(Bytes),
    End,
}

/// One end of a connection.
#[derive(Debug)]
pub struct Connection {
    remote_address: SocketAddr,
    config: Config,
    epoch: Instant,
    role: Role,
    state: ReadyState,
    recv_id: u16,
    send_id: u16,
    seq: SequenceNumber,
    ack: SequenceNumber,
    outgoing: SlotBuffer<OutgoingPacket>,
    incoming: SlotBuffer<Packet>,
    inflight_packets: u16,
    inflight_bytes: usize,
    pending: WriteQueue,
    drain_requested: bool,
    next_write_id: u64,
    paused: bool,
    readable: VecDeque<Readable>,
    fin_received: bool,
    write_ended: bool,
    write_done: bool,
    read_done: bool,
    teardown_scheduled: bool,
}

impl Connection {
    fn new(
        remote_address: SocketAddr,
        config: &Config,
        epoch: Instant,
        role: Role,
        recv_id: u16,
        send_id: u16,
    ) -> Self {
        Self {
            remote_address,
            config: config.clone(),
            epoch,
            role,
            state: ReadyState::Connecting,
            recv_id,
            send_id,
            seq: 1,
            ack: 0,
            outgoing: SlotBuffer::with_capacity(config.buffer_size),
            incoming: SlotBuffer::with_capacity(config.buffer_size),
            inflight_packets: 0,
            inflight_bytes: 0,
            pending: WriteQueue::new(),
            drain_requested: false,
            next_write_id: 0,
            paused: false,
            readable: VecDeque::new(),
            fin_received: false,
            write_ended: false,
            write_done: false,
            read_done: false,
            teardown_scheduled: false,
        }
    }

    /// Opens a connection to `remote_address`: sends a SYN carrying `recv_id` and
    /// waits in `Connecting` for the peer's first STATE.
    pub fn initiate(
        remote_address: SocketAddr,
        recv_id: u16,
        config: &Config,
        epoch: Instant,
        time: Instant,
    ) -> (Self, Vec<Action>) {
        let mut connection = Self::new(
            remote_address,
            config,
            epoch,
            Role::Initiator,
            recv_id,
            recv_id.wrapping_add(1),
        );
        let mut actions = Vec::new();
        connection.send_retained(PacketType::Syn, None, None, time, &mut actions);
        actions.push(Action::Schedule(Timer::Retransmit, time + config.retransmit_interval));
        debug!("Connecting to {} with id {}", remote_address, recv_id);
        (connection, actions)
    }

    /// Accepts a SYN from `remote_address`, starting from a random sequence number.
    pub fn accept(
        remote_address: SocketAddr,
        syn: &Packet,
        config: &Config,
        epoch: Instant,
        time: Instant,
    ) -> (Self, Vec<Action>) {
        let initial_seq = rand::rng().random();
        Self::accept_with_seq(remote_address, syn, initial_seq, config, epoch, time)
    }

    /// Accepts a SYN starting from `initial_seq`. The connection is immediately
    /// `Connected` and acknowledges the SYN.
    pub fn accept_with_seq(
        remote_address: SocketAddr,
        syn: &Packet,
        initial_seq: SequenceNumber,
        config: &Config,
        epoch: Instant,
        time: Instant,
    ) -> (Self, Vec<Action>) {
        let mut connection = Self::new(
            remote_address,
            config,
            epoch,
            Role::Responder,
            syn.connection_id.wrapping_add(1),
            syn.connection_id,
        );
        connection.seq = initial_seq;
        connection.ack = syn.seq;
        connection.state = ReadyState::Connected;

        let mut actions = Vec::new();
        connection.send_ack(time, &mut actions);
        actions.push(Action::Schedule(Timer::Retransmit, time + config.retransmit_interval));
        debug!("Accepted connection {} from {}", connection.recv_id, remote_address);
        (connection, actions)
    }

    /// Address packets are sent to.
    pub fn remote_address(&self) -> SocketAddr {
        self.remote_address
    }

    /// Follows the peer to a new port, as seen on the latest datagram.
    pub fn set_remote_port(&mut self, port: u16) {
        self.remote_address.set_port(port);
    }

    /// Current lifecycle state.
    pub fn ready_state(&self) -> ReadyState {
        self.state
    }

    /// Returns true if this side opened the connection.
    pub fn is_initiator(&self) -> bool {
        self.role == Role::Initiator
    }

    /// Which side opened the connection.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Id the peer puts on packets meant for us.
    pub fn recv_id(&self) -> u16 {
        self.recv_id
    }

    /// Id we put on packets meant for the peer.
    pub fn send_id(&self) -> u16 {
        self.send_id
    }

    /// Next outgoing sequence number.
    pub fn seq(&self) -> SequenceNumber {
        self.seq
    }

    /// Last sequence number received contiguously.
    pub fn ack(&self) -> SequenceNumber {
        self.ack
    }

    /// Packets sent and not yet acknowledged.
    pub fn inflight_packets(&self) -> u16 {
        self.inflight_packets
    }

    /// Payload bytes sent and not yet acknowledged.
    pub fn inflight_bytes(&self) -> usize {
        self.inflight_bytes
    }

    /// Out-of-order packets waiting for a gap to fill.
    pub fn buffered_incoming(&self) -> usize {
        self.incoming.len()
    }

    /// Writes (or remainders of writes) not yet handed to the send path.
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if more data can be sent without exceeding the window.
    pub fn is_writable(&self) -> bool {
        self.inflight_bytes < self.config.window_size as usize
            && self.inflight_packets < self.config.max_inflight_packets()
    }

    /// Dispatches a timer armed through `Action::Schedule`.
    pub fn on_timer(&mut self, timer: Timer, time: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.state.is_closed() {
            return actions;
        }
        match timer {
            Timer::Retransmit => {
                self.retransmit(time, &mut actions);
                actions
                    .push(Action::Schedule(Timer::Retransmit, time + self.config.retransmit_interval));
            }
            Timer::Teardown => self.close(&mut actions),
        }
        actions
    }

    /// Holds back received data until `resume` is called.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Releases data held back by `pause`.
    pub fn resume(&mut self, time: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        self.paused = false;
        while let Some(readable) = self.readable.pop_front() {
            self.emit_readable(readable, time, &mut actions);
        }
        actions
    }

    /// Returns true while the readable side is paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    fn deliver(&mut self, readable: Readable, time: Instant, actions: &mut Vec<Action>) {
        if self.paused && !self.state.is_closed() {
            self.readable.push_back(readable);
        } else {
            self.emit_readable(readable, time, actions);
        }
    }

    fn emit_readable(&mut self, readable: Readable, time: Instant, actions: &mut Vec<Action>) {
        match readable {
            Readable::Data(bytes) => actions.push(Action::Emit(ConnectionEvent::Data(bytes))),
            Readable::End => {
                actions.push(Action::Emit(ConnectionEvent::End));
                self.read_done = true;
                self.maybe_schedule_teardown(time, actions);
            }
        }
    }

    fn close(&mut self, actions: &mut Vec<Action>) {
        if self.state.is_closed() {
            return;
        }
        debug!("Connection {} to {} closed", self.recv_id, self.remote_address);
        self.state = ReadyState::Closed;
        self.outgoing.clear();
        self.incoming.clear();
        self.inflight_packets = 0;
        self.inflight_bytes = 0;
        self.drain_requested = false;
        actions.push(Action::Emit(ConnectionEvent::Close));
    }
}
