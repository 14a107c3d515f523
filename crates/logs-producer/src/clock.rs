// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Injectable time source.
//!
//! Linger and backoff decisions read time through [`Clock`] so they can be
//! driven deterministically in tests. [`TokioClock`] reads
//! [`tokio::time::Instant`], which also honours `tokio::time::pause()`.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub trait Clock: Send + Sync {
    /// Monotonic instant used for linger and retry scheduling.
    fn now(&self) -> Instant;

    /// Wall-clock time in milliseconds since the Unix epoch, used to stamp
    /// attempts.
    fn unix_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    base_millis: i64,
    offset: Mutex<Duration>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            base_millis: chrono::Utc::now().timestamp_millis(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn unix_millis(&self) -> i64 {
        self.base_millis + self.offset.lock().as_millis() as i64
    }
}
