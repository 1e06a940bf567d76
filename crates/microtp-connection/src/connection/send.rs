use std::time::Instant;

use bytes::Bytes;
use microtp_protocol::{timestamp::timestamp_micros, Packet, PacketType};
use tracing::debug;

use super::{Connection, Delivery, OutgoingPacket};
use crate::event_types::{Action, ConnectionEvent};

impl Connection {
    /// Builds the next packet, drawing a fresh sequence number.
    fn next_packet(&mut self, kind: PacketType, payload: Option<Bytes>, time: Instant) -> Packet {
        let connection_id = match kind {
            PacketType::Syn => self.recv_id,
            _ => self.send_id,
        };
        let mut packet = Packet::new(
            kind,
            connection_id,
            self.seq,
            self.ack,
            timestamp_micros(self.epoch, time),
            payload,
        );
        packet.window = self.config.window_size;
        self.seq = self.seq.wrapping_add(1);
        self.inflight_packets = self.inflight_packets.saturating_add(1);
        packet
    }

    /// Sends a packet that stays in `outgoing` until acknowledged. Returns whether
    /// the caller may keep writing.
    pub(crate) fn send_retained(
        &mut self,
        kind: PacketType,
        payload: Option<Bytes>,
        delivery: Option<Delivery>,
        time: Instant,
        actions: &mut Vec<Action>,
    ) -> bool {
        let packet = self.next_packet(kind, payload, time);
        self.inflight_bytes += packet.payload_len();
        actions.push(Action::Send(packet.encode()));
        self.outgoing.put(packet.seq, OutgoingPacket { packet, sent_at: time, delivery });
        self.is_writable()
    }

    /// Sends a bare STATE carrying the current ack. It is not retained.
    pub(crate) fn send_ack(&mut self, time: Instant, actions: &mut Vec<Action>) {
        let packet = self.next_packet(PacketType::State, None, time);
        actions.push(Action::Send(packet.encode()));
    }

    /// Resends every retained packet older than the inflight timeout, oldest first.
    pub(crate) fn retransmit(&mut self, time: Instant, actions: &mut Vec<Action>) {
        let timestamp = timestamp_micros(self.epoch, time);
        for offset in (1..=self.inflight_packets).rev() {
            let seq = self.seq.wrapping_sub(offset);
            let Some(entry) = self.outgoing.get_mut(seq) else {
                continue;
            };
            if time.saturating_duration_since(entry.sent_at) < self.config.inflight_timeout {
                continue;
            }
            entry.sent_at = time;
            entry.packet.timestamp = timestamp;
            actions.push(Action::Send(entry.packet.encode()));
            actions.push(Action::Emit(ConnectionEvent::Resend { seq }));
            debug!("Resending {:?} {} to {}", entry.packet.kind, seq, self.remote_address);
        }
    }
}
