// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Memory admission control.
//!
//! The producer tracks the bytes it has accepted but not yet delivered in a
//! [`ByteCounter`]. Before a record is accepted, [`admit`] checks the counter
//! against the configured limit and, depending on `block_sec`, waits for it
//! to drop. The check and the later increment are not atomic together, so
//! concurrent callers may overshoot the limit slightly.

use std::sync::atomic::{AtomicI64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::constants::ADMISSION_POLL_INTERVAL;
use crate::error::{ProducerError, Result};

/// Bytes admitted and not yet released, scoped to one producer.
#[derive(Debug, Default)]
pub struct ByteCounter(AtomicI64);

impl ByteCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::cast_possible_wrap)]
    pub fn add(&self, bytes: usize) {
        self.0.fetch_add(bytes as i64, Ordering::AcqRel);
    }

    #[allow(clippy::cast_possible_wrap)]
    pub fn sub(&self, bytes: usize) {
        self.0.fetch_sub(bytes as i64, Ordering::AcqRel);
    }

    #[must_use]
    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Release);
    }
}

/// How long a caller may wait for memory to free up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionPolicy {
    /// Fail at once when over the limit.
    FailFast,
    /// Re-check once per poll interval, at most this many times.
    Bounded(u64),
    /// Wait until memory frees up or the producer shuts down.
    Unbounded,
}

impl AdmissionPolicy {
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn from_block_sec(block_sec: i64) -> Self {
        match block_sec {
            0 => AdmissionPolicy::FailFast,
            n if n > 0 => AdmissionPolicy::Bounded(n as u64),
            _ => AdmissionPolicy::Unbounded,
        }
    }
}

/// Waits until `counter` is at or below `limit` as allowed by `policy`.
///
/// Returns [`ProducerError::Closed`] if `shutdown` fires while waiting.
pub async fn admit(
    counter: &ByteCounter,
    limit: i64,
    policy: AdmissionPolicy,
    shutdown: &CancellationToken,
) -> Result<()> {
    if counter.get() <= limit {
        return Ok(());
    }

    let max_polls = match policy {
        AdmissionPolicy::FailFast => {
            return Err(ProducerError::AdmissionTimeout { limit });
        }
        AdmissionPolicy::Bounded(n) => Some(n),
        AdmissionPolicy::Unbounded => None,
    };

    debug!(
        "PRODUCER | {} pending bytes over the {limit} byte limit, waiting for memory",
        counter.get()
    );
    let mut polls = 0u64;
    loop {
        if max_polls.is_some_and(|max| polls >= max) {
            return Err(ProducerError::AdmissionTimeout { limit });
        }
        tokio::select! {
            () = shutdown.cancelled() => return Err(ProducerError::Closed),
            () = tokio::time::sleep(ADMISSION_POLL_INTERVAL) => {}
        }
        polls += 1;
        if counter.get() <= limit {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    #[test]
    fn test_counter_arithmetic() {
        let counter = ByteCounter::new();
        counter.add(100);
        counter.add(50);
        counter.sub(30);
        assert_eq!(counter.get(), 120);
        counter.reset();
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_policy_from_block_sec() {
        assert_eq!(AdmissionPolicy::from_block_sec(0), AdmissionPolicy::FailFast);
        assert_eq!(AdmissionPolicy::from_block_sec(3), AdmissionPolicy::Bounded(3));
        assert_eq!(AdmissionPolicy::from_block_sec(-1), AdmissionPolicy::Unbounded);
    }

    #[tokio::test]
    async fn test_under_limit_is_admitted_immediately() {
        let counter = ByteCounter::new();
        counter.add(10);
        let token = CancellationToken::new();
        admit(&counter, 10, AdmissionPolicy::FailFast, &token)
            .await
            .expect("admitted");
    }

    #[tokio::test]
    async fn test_fail_fast_over_limit() {
        let counter = ByteCounter::new();
        counter.add(11);
        let token = CancellationToken::new();
        let err = admit(&counter, 10, AdmissionPolicy::FailFast, &token)
            .await
            .unwrap_err();
        assert_eq!(err, ProducerError::AdmissionTimeout { limit: 10 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_wait_times_out_after_budget() {
        let counter = ByteCounter::new();
        counter.add(11);
        let token = CancellationToken::new();
        let start = Instant::now();
        let err = admit(&counter, 10, AdmissionPolicy::Bounded(2), &token)
            .await
            .unwrap_err();
        assert_eq!(err, ProducerError::AdmissionTimeout { limit: 10 });
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_millis(2050));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_wait_succeeds_when_memory_frees() {
        let counter = Arc::new(ByteCounter::new());
        counter.add(11);
        let token = CancellationToken::new();

        let releaser = Arc::clone(&counter);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            releaser.sub(11);
        });

        admit(&counter, 10, AdmissionPolicy::Bounded(5), &token)
            .await
            .expect("admitted after release");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_wait_stops_on_shutdown() {
        let counter = ByteCounter::new();
        counter.add(11);
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            canceller.cancel();
        });

        let err = admit(&counter, 10, AdmissionPolicy::Unbounded, &token)
            .await
            .unwrap_err();
        assert_eq!(err, ProducerError::Closed);
    }
}
