// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Time-ordered holding area for batches waiting to be retried.

use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tokio::time::Instant;
use tracing::debug;

use crate::batch::Batch;

struct RetryEntry {
    next_retry: Instant,
    seq: u64,
    batch: Batch,
}

// `BinaryHeap` is a max-heap, so the comparison is reversed: the entry with
// the earliest `next_retry` (then the lowest sequence number) is the greatest.
impl Ord for RetryEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .next_retry
            .cmp(&self.next_retry)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for RetryEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RetryEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RetryEntry {}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<RetryEntry>,
    next_seq: u64,
}

/// Min-heap of failed batches keyed by their next eligible retry instant.
///
/// Batches scheduled for the same instant come back in the order they were
/// scheduled.
#[derive(Default)]
pub struct RetryScheduler {
    inner: Mutex<Inner>,
}

impl RetryScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a batch. Its `next_retry` must already be set.
    pub fn schedule(&self, batch: Batch) {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        debug!(
            "PRODUCER | Scheduling retry of batch {} (attempt {}, backoff {:?})",
            batch.id(),
            batch.attempt_count(),
            batch.backoff()
        );
        inner.heap.push(RetryEntry {
            next_retry: batch.next_retry(),
            seq,
            batch,
        });
    }

    /// Removes and returns every batch whose retry instant is at or before
    /// `now`, earliest first.
    pub fn pop_due(&self, now: Instant) -> Vec<Batch> {
        let mut inner = self.inner.lock();
        let mut due = Vec::new();
        while inner.heap.peek().is_some_and(|e| e.next_retry <= now) {
            if let Some(entry) = inner.heap.pop() {
                due.push(entry.batch);
            }
        }
        due
    }

    /// Removes and returns every batch regardless of its retry instant.
    pub fn drain_all(&self) -> Vec<Batch> {
        let mut inner = self.inner.lock();
        let mut all = Vec::with_capacity(inner.heap.len());
        while let Some(entry) = inner.heap.pop() {
            all.push(entry.batch);
        }
        all
    }

    /// Earliest pending retry instant, if any.
    #[must_use]
    pub fn next_due(&self) -> Option<Instant> {
        self.inner.lock().heap.peek().map(|e| e.next_retry)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().heap.is_empty()
    }
}
