// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-key accumulator of log records.
//!
//! A [`Batch`] is created by the dispatcher for the first record of a routing
//! key and grows while it sits in the open-batch map. Once flushed it is moved
//! (never shared) through the ready queue, the sender and possibly the retry
//! scheduler, so at any instant exactly one component owns it. The only
//! mutations after the flush are the retry bookkeeping done by the sender that
//! currently holds it.
//!
//! # Lifecycle
//!
//! ```text
//!  first record ──> open (append / attach_callback)
//!                     │ flush (size, count, linger, shutdown)
//!                     v
//!                  frozen ──> sender ──> success / give up ──> callbacks, dropped
//!                               │ retryable failure
//!                               v
//!                          retry scheduler ──> ready queue ──> sender ...
//! ```

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::callback::{Attempt, ProducerResult, SharedCallback};
use crate::record::{LogRecord, RoutingKey};

/// Identifier assigned by the dispatcher, unique per producer.
pub type BatchId = u64;

pub struct Batch {
    id: BatchId,
    key: RoutingKey,
    records: Vec<LogRecord>,
    /// Sum of the encoded sizes of `records`.
    size_bytes: AtomicUsize,
    attempt_count: usize,
    backoff: Duration,
    next_retry: Instant,
    created_at: Instant,
    callbacks: Vec<SharedCallback>,
    result: ProducerResult,
    reserved_attempts: usize,
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("records", &self.records.len())
            .field("size_bytes", &self.size_bytes())
            .field("attempt_count", &self.attempt_count)
            .field("backoff", &self.backoff)
            .field("callbacks", &self.callbacks.len())
            .finish_non_exhaustive()
    }
}

impl Batch {
    /// Opens a batch seeded with its first record.
    #[must_use]
    pub fn new(
        id: BatchId,
        key: RoutingKey,
        record: LogRecord,
        callback: Option<SharedCallback>,
        created_at: Instant,
        reserved_attempts: usize,
    ) -> Self {
        let mut batch = Self {
            id,
            key,
            records: Vec::new(),
            size_bytes: AtomicUsize::new(0),
            attempt_count: 0,
            backoff: Duration::ZERO,
            next_retry: created_at,
            created_at,
            callbacks: Vec::new(),
            result: ProducerResult::default(),
            reserved_attempts,
        };
        batch.append(record);
        if let Some(callback) = callback {
            batch.attach_callback(callback);
        }
        batch
    }

    /// Adds a record at the end of the batch.
    pub fn append(&mut self, record: LogRecord) {
        self.size_bytes
            .fetch_add(record.encoded_size(), Ordering::AcqRel);
        self.records.push(record);
    }

    pub fn attach_callback(&mut self, callback: SharedCallback) {
        self.callbacks.push(callback);
    }

    /// Records one send outcome. The attempt count always increases; the
    /// history keeps only the first `reserved_attempts` entries.
    pub fn record_attempt(&mut self, attempt: Attempt) {
        if self.attempt_count < self.reserved_attempts {
            self.result.attempts.push(attempt);
        }
        self.attempt_count += 1;
    }

    pub fn mark_success(&mut self) {
        self.result.success = true;
    }

    pub fn mark_failure(&mut self) {
        self.result.success = false;
    }

    /// Invokes every attached callback with the current result: success
    /// handlers if the batch was marked successful, failure handlers
    /// otherwise.
    pub fn notify_callbacks(&self) {
        debug!(
            "PRODUCER | Running {} callback(s) for batch {} (success: {})",
            self.callbacks.len(),
            self.id,
            self.result.success
        );
        for callback in &self.callbacks {
            if self.result.success {
                callback.on_success(&self.result);
            } else {
                callback.on_failure(&self.result);
            }
        }
    }

    pub(crate) fn schedule_retry(&mut self, backoff: Duration, next_retry: Instant) {
        self.backoff = backoff;
        self.next_retry = next_retry;
    }

    pub(crate) fn reset_backoff(&mut self) {
        self.backoff = Duration::ZERO;
    }

    #[must_use]
    pub fn id(&self) -> BatchId {
        self.id
    }

    #[must_use]
    pub fn key(&self) -> &RoutingKey {
        &self.key
    }

    #[must_use]
    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.size_bytes.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.attempt_count
    }

    #[must_use]
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    #[must_use]
    pub fn next_retry(&self) -> Instant {
        self.next_retry
    }

    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time elapsed since the batch was opened, saturating at zero.
    #[must_use]
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    #[must_use]
    pub fn result(&self) -> &ProducerResult {
        &self.result
    }
}
