// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of one batch and classification of the outcome.
//!
//! A send either succeeds, fails terminally (the batch's failure callbacks
//! fire) or fails in a retryable way, in which case the batch is handed to the
//! [`RetryScheduler`] with a grown backoff. The byte counter is released only
//! on terminal outcomes.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::admission::ByteCounter;
use crate::batch::Batch;
use crate::callback::Attempt;
use crate::clock::Clock;
use crate::config::ProducerSettings;
use crate::constants::BACKOFF_INCREASE_UNIT;
use crate::error::SendError;
use crate::retry_queue::RetryScheduler;
use crate::transport::{SendReceipt, Transport};

/// Backoff to apply after a retryable failure.
///
/// `attempt_count` is the count after recording the failure. The first
/// failure adds `base`; later ones add `jitter`, drawn from
/// `[0, BACKOFF_INCREASE_UNIT]`. The result never exceeds `max`.
#[must_use]
pub fn next_backoff(
    current: Duration,
    attempt_count: usize,
    base: Duration,
    max: Duration,
    jitter: Duration,
) -> Duration {
    let increment = if attempt_count == 1 { base } else { jitter };
    current.saturating_add(increment).min(max)
}

#[allow(clippy::cast_possible_truncation)]
fn random_jitter() -> Duration {
    Duration::from_millis(fastrand::u64(0..=BACKOFF_INCREASE_UNIT.as_millis() as u64))
}

pub struct Sender {
    transport: Arc<dyn Transport>,
    permits: Semaphore,
    retry_queue: Arc<RetryScheduler>,
    counter: Arc<ByteCounter>,
    settings: Arc<ProducerSettings>,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
}

impl Sender {
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        retry_queue: Arc<RetryScheduler>,
        counter: Arc<ByteCounter>,
        settings: Arc<ProducerSettings>,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Self {
        Sender {
            transport,
            permits: Semaphore::new(settings.sender_count),
            retry_queue,
            counter,
            settings,
            clock,
            shutdown,
        }
    }

    /// Sends `batch` once and routes it by outcome.
    pub async fn handle(&self, batch: Batch) {
        // Acquire only fails on a closed semaphore and this one is never closed.
        let _permit = self.permits.acquire().await.ok();
        debug!(
            "PRODUCER | Sending batch {} ({} records, {} bytes) to {}",
            batch.id(),
            batch.record_count(),
            batch.size_bytes(),
            batch.key().topic_id
        );
        let outcome = self.transport.send(&batch).await;
        match outcome {
            Ok(receipt) => self.on_success(batch, receipt),
            Err(e) => self.on_failure(batch, e),
        }
    }

    fn on_success(&self, mut batch: Batch, receipt: SendReceipt) {
        self.counter.sub(batch.size_bytes());
        batch.record_attempt(Attempt::success(
            receipt.request_id,
            self.clock.unix_millis(),
        ));
        batch.mark_success();
        batch.reset_backoff();
        batch.notify_callbacks();
    }

    fn on_failure(&self, mut batch: Batch, err: SendError) {
        let status = err.status_code();
        let give_up = self.shutdown.is_cancelled()
            || status.is_some_and(|s| self.settings.is_no_retry_status(s))
            || batch.attempt_count() >= self.settings.retries;

        let attempt = match err {
            SendError::Transport(e) => {
                warn!(
                    "PRODUCER | Batch {} failed (status: {:?}, code: {}, request id: {}): {}",
                    batch.id(),
                    e.status_code,
                    e.code,
                    e.request_id,
                    e.message
                );
                Attempt::failure(e.request_id, e.code, e.message, self.clock.unix_millis())
            }
            SendError::Internal(message) => {
                error!(
                    "PRODUCER | Internal error while sending batch {}: {}",
                    batch.id(),
                    message
                );
                Attempt::failure("", "", message, self.clock.unix_millis())
            }
        };
        batch.record_attempt(attempt);

        if give_up {
            debug!(
                "PRODUCER | Giving up on batch {} after {} attempt(s)",
                batch.id(),
                batch.attempt_count()
            );
            self.fail(batch);
            return;
        }

        let backoff = next_backoff(
            batch.backoff(),
            batch.attempt_count(),
            self.settings.base_retry_backoff,
            self.settings.max_retry_backoff,
            random_jitter(),
        );
        batch.schedule_retry(backoff, self.clock.now() + backoff);
        self.retry_queue.schedule(batch);
    }

    /// Terminates `batch` as failed without sending it again.
    pub fn fail(&self, mut batch: Batch) {
        self.counter.sub(batch.size_bytes());
        batch.mark_failure();
        batch.notify_callbacks();
    }
}
