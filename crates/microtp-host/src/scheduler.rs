use std::{
    cmp::Reverse,
    collections::{BinaryHeap, VecDeque},
    time::Instant,
};

use microtp_connection::{Deferred, Timer};

use crate::event_types::ConnectionHandle;

/// Timers and deferred tasks for every connection of a host, keyed by handle.
///
/// Deferred tasks run after the unit of work that queued them, in FIFO order.
/// Timers fire in deadline order; ties keep insertion order.
#[derive(Debug, Default)]
pub struct Scheduler {
    timers: BinaryHeap<Reverse<(Instant, u64, ConnectionHandle, Timer)>>,
    deferred: VecDeque<(ConnectionHandle, Deferred)>,
    next_id: u64,
}

impl Scheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `timer` for `handle` at `deadline`.
    pub fn schedule(&mut self, handle: ConnectionHandle, timer: Timer, deadline: Instant) {
        self.timers.push(Reverse((deadline, self.next_id, handle, timer)));
        self.next_id += 1;
    }

    /// Queues a task to run after the current unit of work.
    pub fn defer(&mut self, handle: ConnectionHandle, task: Deferred) {
        self.deferred.push_back((handle, task));
    }

    /// Takes the oldest deferred task.
    pub fn pop_deferred(&mut self) -> Option<(ConnectionHandle, Deferred)> {
        self.deferred.pop_front()
    }

    /// Takes the earliest timer whose deadline is at or before `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<(ConnectionHandle, Timer)> {
        let due = matches!(self.timers.peek(), Some(Reverse((deadline, ..))) if *deadline <= now);
        if !due {
            return None;
        }
        self.timers.pop().map(|Reverse((_, _, handle, timer))| (handle, timer))
    }

    /// Deadline of the next timer, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.peek().map(|Reverse((deadline, ..))| *deadline)
    }

    /// Drops every timer and deferred task of `handle`.
    pub fn cancel(&mut self, handle: ConnectionHandle) {
        self.timers.retain(|Reverse((_, _, owner, _))| *owner != handle);
        self.deferred.retain(|(owner, _)| *owner != handle);
    }

    /// Number of armed timers.
    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }
}
