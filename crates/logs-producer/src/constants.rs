// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Defaults and limits for the producer pipeline.
//!
//! Every tunable in [`crate::config::ProducerConfig`] has a default and a valid
//! range defined here. Values supplied outside their range are replaced by the
//! default rather than rejected.

use std::time::Duration;

/// Default ceiling on bytes admitted but not yet delivered (100 MiB).
pub const TOTAL_SIZE_IN_BYTES_DEFAULT: i64 = 100 * 1024 * 1024;
pub const TOTAL_SIZE_IN_BYTES_MAX: i64 = i64::MAX;

/// Default number of concurrent senders.
pub const SENDER_COUNT_DEFAULT: usize = 10;
pub const SENDER_COUNT_MAX: usize = i32::MAX as usize;

/// Default number of attempts kept in a batch's history.
pub const RESERVED_ATTEMPTS_DEFAULT: usize = 11;
pub const RESERVED_ATTEMPTS_MAX: usize = i32::MAX as usize;

/// Default maximum number of records per batch.
pub const BATCH_COUNT_DEFAULT: usize = 4096;
pub const BATCH_COUNT_MAX: usize = 10_000;

/// Default soft byte limit per batch (512 KiB).
pub const BATCH_SIZE_DEFAULT: usize = 512 * 1024;

/// Hard cap on the byte size of a batch (5 MiB).
///
/// A batch that has already crossed [`BATCH_SIZE_DEFAULT`] (or the configured
/// soft limit) may still take one more record as long as it is below this cap.
pub const BATCH_SIZE_MAX: usize = 5 * 1024 * 1024;

pub const BASE_RETRY_BACKOFF_MS_DEFAULT: u64 = 1000;
pub const BASE_RETRY_BACKOFF_MS_MAX: u64 = i32::MAX as u64;

pub const RETRY_BACKOFF_MS_DEFAULT: u64 = 10 * 1000;
pub const RETRY_BACKOFF_MS_MAX: u64 = i32::MAX as u64;

/// Upper bound of the random increment added to the backoff after the first
/// failed attempt.
pub const BACKOFF_INCREASE_UNIT: Duration = Duration::from_millis(1000);

pub const LINGER_TIME_DEFAULT: Duration = Duration::from_millis(2000);
pub const LINGER_TIME_MIN: Duration = Duration::from_millis(100);
pub const LINGER_TIME_MAX: Duration = Duration::from_secs(60 * 60);

pub const RETRIES_DEFAULT: usize = 10;
pub const RETRIES_MAX: usize = i32::MAX as usize;

/// Seconds to wait for memory to free up before rejecting a record.
pub const BLOCK_SEC_DEFAULT: i64 = 60;

/// Status codes that are never retried.
pub const NO_RETRY_STATUS_CODES_DEFAULT: [u16; 2] = [400, 404];

/// Capacity of the queue between callers and the dispatcher.
pub(crate) const INBOUND_QUEUE_CAPACITY: usize = 100;

/// Capacity of the queue between the dispatcher and the sender workers.
pub(crate) const READY_QUEUE_CAPACITY: usize = 100;

/// Pause between two dispatcher tick cycles.
pub(crate) const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Interval between two admission checks while the producer is over its
/// memory limit.
pub(crate) const ADMISSION_POLL_INTERVAL: Duration = Duration::from_secs(1);
