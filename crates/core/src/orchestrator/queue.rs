//! Priority wait list for queued jobs.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::job::JobId;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Waiting {
    priority: i32,
    /// Admission sequence number; lower was queued earlier.
    seq: u64,
    job_id: JobId,
}

impl Ord for Waiting {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then earlier admission
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Waiting {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Jobs waiting for a concurrency slot, ordered by priority then FIFO.
#[derive(Debug, Default)]
pub struct WaitList {
    heap: BinaryHeap<Waiting>,
    next_seq: u64,
}

impl WaitList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job_id: JobId, priority: i32) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Waiting {
            priority,
            seq,
            job_id,
        });
    }

    /// Removes and returns the next job to admit.
    pub fn pop(&mut self) -> Option<JobId> {
        self.heap.pop().map(|w| w.job_id)
    }

    /// Removes a specific job. Returns false if it was not waiting.
    pub fn remove(&mut self, job_id: &JobId) -> bool {
        let before = self.heap.len();
        self.heap.retain(|w| &w.job_id != job_id);
        self.heap.len() != before
    }

    pub fn contains(&self, job_id: &JobId) -> bool {
        self.heap.iter().any(|w| &w.job_id == job_id)
    }

    /// Empties the list, returning the ids in admission order.
    pub fn drain(&mut self) -> Vec<JobId> {
        let mut ids = Vec::with_capacity(self.heap.len());
        while let Some(id) = self.pop() {
            ids.push(id);
        }
        ids
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
