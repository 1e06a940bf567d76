use std::time::Instant;

use microtp_protocol::{
    sequence::{is_outside_window, sequence_distance},
    Packet, PacketType, SequenceNumber,
};
use tracing::{debug, trace, warn};

use super::{Connection, Delivery, Readable};
use crate::{
    event_types::{Action, ConnectionEvent, Deferred},
    ready_state::ReadyState,
};

impl Connection {
    /// Processes one decoded packet addressed to this connection.
    pub fn process_packet(&mut self, packet: Packet, time: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        let kind = packet.kind;
        match self.state {
            ReadyState::Closed => {
                trace!("Discarding {:?} on closed connection {}", kind, self.recv_id);
            }
            ReadyState::Connecting => match kind {
                PacketType::State => self.complete_handshake(packet, time, &mut actions),
                PacketType::Syn => {}
                _ => self.incoming.put(packet.seq, packet),
            },
            ReadyState::Connected | ReadyState::HalfOpen => {
                self.receive(packet, time, &mut actions)
            }
        }
        actions
    }

    fn complete_handshake(&mut self, packet: Packet, time: Instant, actions: &mut Vec<Action>) {
        self.ack = packet.seq;
        self.recv_ack(packet.ack, time, actions);
        self.state = ReadyState::Connected;
        debug!("Connection {} to {} established", self.recv_id, self.remote_address);
        actions.push(Action::Emit(ConnectionEvent::Connect));
        self.flush_pending(time, actions);
        self.drain_incoming(time, actions);
    }

    fn receive(&mut self, packet: Packet, time: Instant, actions: &mut Vec<Action>) {
        if is_outside_window(self.ack, packet.seq, self.incoming.capacity()) {
            trace!(
                "Packet {} outside receive window (ack {}), re-acknowledging",
                packet.seq,
                self.ack
            );
            self.send_ack(time, actions);
            return;
        }
        self.incoming.put(packet.seq, packet);
        self.drain_incoming(time, actions);
    }

    fn drain_incoming(&mut self, time: Instant, actions: &mut Vec<Action>) {
        let mut should_ack = false;
        while let Some(packet) = self.incoming.remove(self.ack.wrapping_add(1)) {
            self.ack = packet.seq;
            match packet.kind {
                PacketType::Data => {
                    if let Some(payload) = packet.payload {
                        if !self.fin_received {
                            self.deliver(Readable::Data(payload), time, actions);
                        }
                    }
                    should_ack = true;
                }
                PacketType::Fin => {
                    if !self.fin_received {
                        self.fin_received = true;
                        if self.state == ReadyState::Connected {
                            self.state = ReadyState::HalfOpen;
                        }
                        debug!("Connection {} half open", self.recv_id);
                        self.deliver(Readable::End, time, actions);
                    }
                    should_ack = true;
                }
                PacketType::Reset => {
                    self.on_reset(actions);
                    return;
                }
                PacketType::State | PacketType::Syn | PacketType::Other(_) => {}
            }
            self.recv_ack(packet.ack, time, actions);
        }

        if should_ack {
            self.send_ack(time, actions);
        }
    }

    /// Releases everything the peer acknowledged up to and including `ack`.
    pub(crate) fn recv_ack(&mut self, ack: SequenceNumber, time: Instant, actions: &mut Vec<Action>) {
        let prev_acked = self.seq.wrapping_sub(self.inflight_packets).wrapping_sub(1);
        let acks_now = sequence_distance(prev_acked, ack);
        if acks_now == 0 {
            return;
        }
        if acks_now >= self.outgoing.capacity() {
            trace!("Ignoring stale ack {} (last acked {})", ack, prev_acked);
            return;
        }
        if acks_now > self.inflight_packets {
            warn!(
                "Ignoring ack {} for {} packets with only {} in flight",
                ack, acks_now, self.inflight_packets
            );
            return;
        }

        for offset in 1..=acks_now {
            let seq = prev_acked.wrapping_add(offset);
            self.inflight_packets -= 1;
            let Some(entry) = self.outgoing.remove(seq) else {
                continue;
            };
            self.inflight_bytes -= entry.packet.payload_len();
            match entry.delivery {
                Some(Delivery::Write(id)) => {
                    actions.push(Action::Emit(ConnectionEvent::Delivered(id)))
                }
                Some(Delivery::Fin) | None => {}
            }
        }

        if self.inflight_bytes == 0 && self.drain_requested {
            self.drain_requested = false;
            actions.push(Action::Defer(Deferred::Drain));
        }
        self.maybe_schedule_teardown(time, actions);
    }

    fn on_reset(&mut self, actions: &mut Vec<Action>) {
        debug!("Connection {} reset by {}", self.recv_id, self.remote_address);
        self.fail_writes(actions);

        self.paused = false;
        while let Some(readable) = self.readable.pop_front() {
            if let Readable::Data(bytes) = readable {
                actions.push(Action::Emit(ConnectionEvent::Data(bytes)));
            }
        }
        if !self.read_done {
            self.read_done = true;
            self.fin_received = true;
            actions.push(Action::Emit(ConnectionEvent::End));
        }
        self.close(actions);
    }
}
