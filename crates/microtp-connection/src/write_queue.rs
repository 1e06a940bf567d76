use std::collections::VecDeque;

use bytes::Bytes;

use crate::event_types::WriteId;

/// What a queued write sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteKind {
    /// Bytes still to be segmented and sent.
    Data(Bytes),
    /// Finish the write side.
    Fin,
}

/// A write that has not been fully handed to the send path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    /// Id reported back in `Written`/`Delivered`/`WriteFailed`.
    pub id: WriteId,
    /// Payload or FIN.
    pub kind: WriteKind,
}

/// FIFO of writes submitted while connecting or while blocked on backpressure.
///
/// A write interrupted by backpressure goes back to the front so its remaining
/// bytes leave before anything submitted later.
#[derive(Debug, Default)]
pub struct WriteQueue {
    writes: VecDeque<PendingWrite>,
}

impl WriteQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a write.
    pub fn push_back(&mut self, write: PendingWrite) {
        self.writes.push_back(write);
    }

    /// Puts the unsent remainder of an interrupted write back at the head.
    pub fn push_front(&mut self, write: PendingWrite) {
        self.writes.push_front(write);
    }

    /// Takes the oldest write.
    pub fn pop_front(&mut self) -> Option<PendingWrite> {
        self.writes.pop_front()
    }

    /// Returns the number of queued writes.
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Returns the number of payload bytes waiting.
    pub fn queued_bytes(&self) -> usize {
        self.writes
            .iter()
            .map(|write| match &write.kind {
                WriteKind::Data(bytes) => bytes.len(),
                WriteKind::Fin => 0,
            })
            .sum()
    }

    /// Drains all writes in submission order.
    pub fn drain(&mut self) -> impl Iterator<Item = PendingWrite> + '_ {
        self.writes.drain(..)
    }
}
