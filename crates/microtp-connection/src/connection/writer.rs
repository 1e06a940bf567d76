use std::time::Instant;

use bytes::Bytes;
use microtp_core::error::{ErrorKind, Result};
use microtp_protocol::PacketType;
use tracing::debug;

use super::{Connection, Delivery};
use crate::{
    event_types::{Action, ConnectionEvent, Timer, WriteId},
    write_queue::{PendingWrite, WriteKind},
};

impl Connection {
    /// Queues `data` for sending.
    ///
    /// `Written` is emitted once the last segment has been handed to the send path and
    /// `Delivered` once the peer acknowledges it. While connecting, or while earlier
    /// writes wait for the window to open, the data is queued and sent automatically.
    pub fn write(&mut self, data: Bytes, time: Instant) -> Result<(WriteId, Vec<Action>)> {
        if self.state.is_closed() {
            return Err(ErrorKind::ConnectionClosed);
        }
        if self.write_ended {
            return Err(ErrorKind::WriteAfterEnd);
        }

        let id = WriteId(self.next_write_id);
        self.next_write_id += 1;
        self.pending.push_back(PendingWrite { id, kind: WriteKind::Data(data) });

        let mut actions = Vec::new();
        self.flush_pending(time, &mut actions);
        Ok((id, actions))
    }

    /// Finishes the write side. A FIN follows every write queued so far.
    pub fn end(&mut self, time: Instant) -> Result<Vec<Action>> {
        if self.state.is_closed() {
            return Err(ErrorKind::ConnectionClosed);
        }
        let mut actions = Vec::new();
        if self.write_ended {
            return Ok(actions);
        }
        self.write_ended = true;

        let id = WriteId(self.next_write_id);
        self.next_write_id += 1;
        self.pending.push_back(PendingWrite { id, kind: WriteKind::Fin });
        self.flush_pending(time, &mut actions);
        Ok(actions)
    }

    /// Tears the connection down at once: sends a RESET, fails every outstanding
    /// write and closes.
    pub fn abort(&mut self, time: Instant) -> Result<Vec<Action>> {
        if self.state.is_closed() {
            return Err(ErrorKind::ConnectionClosed);
        }
        let mut actions = Vec::new();
        debug!("Aborting connection {} to {}", self.recv_id, self.remote_address);
        self.send_retained(PacketType::Reset, None, None, time, &mut actions);
        self.fail_writes(&mut actions);
        self.close(&mut actions);
        Ok(actions)
    }

    /// Runs the deferred drain task: resumes writes blocked on backpressure and
    /// reports `Drain` once none are left.
    pub fn on_drain(&mut self, time: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.state.is_closed() {
            return actions;
        }
        self.flush_pending(time, &mut actions);
        if !self.drain_requested && self.pending.is_empty() {
            actions.push(Action::Emit(ConnectionEvent::Drain));
        }
        actions
    }

    /// Hands queued writes to the send path until the queue empties or a send
    /// reports the window is full.
    pub(crate) fn flush_pending(&mut self, time: Instant, actions: &mut Vec<Action>) {
        if !self.state.is_established() {
            return;
        }

        while !self.drain_requested {
            let Some(PendingWrite { id, kind }) = self.pending.pop_front() else {
                break;
            };
            match kind {
                WriteKind::Data(mut bytes) => {
                    if bytes.is_empty() {
                        actions.push(Action::Emit(ConnectionEvent::Written(id)));
                        continue;
                    }
                    loop {
                        let segment = bytes.split_to(bytes.len().min(self.config.max_segment_size));
                        let last = bytes.is_empty();
                        let delivery = last.then_some(Delivery::Write(id));
                        let writable =
                            self.send_retained(PacketType::Data, Some(segment), delivery, time, actions);
                        if last {
                            actions.push(Action::Emit(ConnectionEvent::Written(id)));
                            self.drain_requested = !writable;
                            break;
                        }
                        if !writable {
                            self.pending.push_front(PendingWrite { id, kind: WriteKind::Data(bytes) });
                            self.drain_requested = true;
                            break;
                        }
                    }
                }
                WriteKind::Fin => {
                    let writable =
                        self.send_retained(PacketType::Fin, None, Some(Delivery::Fin), time, actions);
                    self.drain_requested = !writable;
                    // The FIN stays retained and is resent until acked or torn down.
                    self.write_done = true;
                    debug!("Sent FIN on connection {}", self.recv_id);
                    self.maybe_schedule_teardown(time, actions);
                }
            }
        }
    }

    /// Reports every write that will never be acknowledged, oldest first.
    pub(crate) fn fail_writes(&mut self, actions: &mut Vec<Action>) {
        for offset in (1..=self.inflight_packets).rev() {
            let seq = self.seq.wrapping_sub(offset);
            if let Some(entry) = self.outgoing.remove(seq) {
                if let Some(Delivery::Write(id)) = entry.delivery {
                    actions.push(Action::Emit(ConnectionEvent::WriteFailed(id)));
                }
            }
        }
        for write in self.pending.drain() {
            if let WriteKind::Data(_) = write.kind {
                actions.push(Action::Emit(ConnectionEvent::WriteFailed(write.id)));
            }
        }
    }

    pub(crate) fn maybe_schedule_teardown(&mut self, time: Instant, actions: &mut Vec<Action>) {
        if self.write_done && self.read_done && !self.teardown_scheduled {
            self.teardown_scheduled = true;
            debug!("Connection {} finished both ways, closing after grace period", self.recv_id);
            actions.push(Action::Schedule(Timer::Teardown, time + self.config.close_grace));
        }
    }
}
