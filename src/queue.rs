//! Due-time ordered queue of pending tasks.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use tokio::time::Instant;

use crate::task::TaskCell;

/// One queued firing: the due instant plus a stable insertion sequence, so
/// tasks with equal due times fire in insertion order.
pub(crate) struct QueueEntry {
    pub(crate) due: Instant,
    seq: u64,
    pub(crate) task: Arc<TaskCell>,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Pending tasks ordered by next execution time.
///
/// Cancelled entries are removed lazily: the worker drops them when they
/// reach the front, [`TaskQueue::purge_cancelled`] sweeps them in bulk.
pub(crate) struct TaskQueue {
    heap: BinaryHeap<Reverse<QueueEntry>>,
    next_seq: u64,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Insert a task due at `due`, preserving due-time order.
    pub(crate) fn insert(&mut self, due: Instant, task: Arc<TaskCell>) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.heap.push(Reverse(QueueEntry { due, seq, task }));
    }

    /// The earliest-due entry, without removing it.
    pub(crate) fn peek_earliest(&self) -> Option<&QueueEntry> {
        self.heap.peek().map(|Reverse(entry)| entry)
    }

    /// Remove and return the earliest-due entry.
    pub(crate) fn pop_earliest(&mut self) -> Option<QueueEntry> {
        self.heap.pop().map(|Reverse(entry)| entry)
    }

    /// Remove every cancelled entry. Returns how many were dropped.
    pub(crate) fn purge_cancelled(&mut self) -> usize {
        let before = self.heap.len();
        self.heap
            .retain(|entry| !entry.0.task.state().is_cancelled());
        before.saturating_sub(self.heap.len())
    }

    /// Entries still scheduled to fire.
    pub(crate) fn scheduled_count(&self) -> usize {
        self.heap
            .iter()
            .filter(|entry| entry.0.task.state().is_scheduled())
            .count()
    }

    pub(crate) fn clear(&mut self) {
        self.heap.clear();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
