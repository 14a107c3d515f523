// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Producer configuration.
//!
//! [`ProducerConfig`] is the user-facing, loosely typed form: every field is
//! optional when deserialized and may hold any value. [`ProducerConfig::normalized`]
//! turns it into [`ProducerSettings`], where each option is guaranteed to be
//! inside its valid range. Out-of-range values fall back to the default with a
//! warning instead of failing.

use hashbrown::HashSet;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use crate::constants::{
    BASE_RETRY_BACKOFF_MS_DEFAULT, BASE_RETRY_BACKOFF_MS_MAX, BATCH_COUNT_DEFAULT,
    BATCH_COUNT_MAX, BATCH_SIZE_DEFAULT, BATCH_SIZE_MAX, BLOCK_SEC_DEFAULT, LINGER_TIME_DEFAULT,
    LINGER_TIME_MAX, LINGER_TIME_MIN, NO_RETRY_STATUS_CODES_DEFAULT, RESERVED_ATTEMPTS_DEFAULT,
    RESERVED_ATTEMPTS_MAX, RETRIES_DEFAULT, RETRIES_MAX, RETRY_BACKOFF_MS_DEFAULT,
    RETRY_BACKOFF_MS_MAX, SENDER_COUNT_DEFAULT, SENDER_COUNT_MAX, TOTAL_SIZE_IN_BYTES_DEFAULT,
    TOTAL_SIZE_IN_BYTES_MAX,
};
use crate::error::{ProducerError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Upper bound on bytes admitted but not yet delivered.
    #[serde(alias = "TotalSizeInBytes")]
    pub total_size_in_bytes: i64,
    #[serde(alias = "MaxSenderCount", alias = "SenderCount")]
    pub sender_count: i64,
    /// Maximum records per batch.
    #[serde(alias = "MaxBatchCount", alias = "BatchCount")]
    pub batch_count: i64,
    /// Soft byte limit per batch.
    #[serde(alias = "MaxBatchSize", alias = "BatchSize")]
    pub batch_size: i64,
    #[serde(alias = "BaseRetryBackoffMs")]
    pub base_retry_backoff_ms: i64,
    /// Ceiling on the retry backoff.
    #[serde(alias = "MaxRetryBackoffMs", alias = "RetryBackoffMs")]
    pub retry_backoff_ms: i64,
    #[serde(alias = "LingerMs", alias = "LingerTime")]
    pub linger_ms: i64,
    #[serde(alias = "Retries")]
    pub retries: i64,
    /// Number of attempts kept in each batch's result.
    #[serde(alias = "MaxReservedAttempts", alias = "ReservedAttempts")]
    pub reserved_attempts: i64,
    /// Seconds to wait for memory below `total_size_in_bytes`. Zero fails
    /// immediately, negative waits forever.
    #[serde(alias = "MaxBlockSec", alias = "BlockSec")]
    pub block_sec: i64,
    #[serde(alias = "NoRetryStatusCodeList")]
    pub no_retry_status_codes: Vec<u16>,
}

impl Default for ProducerConfig {
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    fn default() -> Self {
        Self {
            total_size_in_bytes: TOTAL_SIZE_IN_BYTES_DEFAULT,
            sender_count: SENDER_COUNT_DEFAULT as i64,
            batch_count: BATCH_COUNT_DEFAULT as i64,
            batch_size: BATCH_SIZE_DEFAULT as i64,
            base_retry_backoff_ms: BASE_RETRY_BACKOFF_MS_DEFAULT as i64,
            retry_backoff_ms: RETRY_BACKOFF_MS_DEFAULT as i64,
            linger_ms: LINGER_TIME_DEFAULT.as_millis() as i64,
            retries: RETRIES_DEFAULT as i64,
            reserved_attempts: RESERVED_ATTEMPTS_DEFAULT as i64,
            block_sec: BLOCK_SEC_DEFAULT,
            no_retry_status_codes: NO_RETRY_STATUS_CODES_DEFAULT.to_vec(),
        }
    }
}

/// Validated settings used by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerSettings {
    pub total_size_in_bytes: i64,
    pub sender_count: usize,
    pub batch_count: usize,
    pub batch_size: usize,
    pub base_retry_backoff: Duration,
    pub max_retry_backoff: Duration,
    pub linger: Duration,
    pub retries: usize,
    pub reserved_attempts: usize,
    pub block_sec: i64,
    pub no_retry_status_codes: HashSet<u16>,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        ProducerConfig::default().normalized()
    }
}

impl ProducerSettings {
    #[must_use]
    pub fn is_no_retry_status(&self, status: u16) -> bool {
        self.no_retry_status_codes.contains(&status)
    }
}

impl ProducerConfig {
    /// Parses a JSON document. Missing fields take their default.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| ProducerError::InvalidConfig(e.to_string()))
    }

    /// Clamps every option into its valid range.
    #[must_use]
    pub fn normalized(&self) -> ProducerSettings {
        ProducerSettings {
            total_size_in_bytes: ensure_in_range(
                "total_size_in_bytes",
                self.total_size_in_bytes,
                0,
                TOTAL_SIZE_IN_BYTES_MAX,
                TOTAL_SIZE_IN_BYTES_DEFAULT,
            ),
            sender_count: ensure_usize(
                "sender_count",
                self.sender_count,
                1,
                SENDER_COUNT_MAX,
                SENDER_COUNT_DEFAULT,
            ),
            batch_count: ensure_usize(
                "batch_count",
                self.batch_count,
                0,
                BATCH_COUNT_MAX,
                BATCH_COUNT_DEFAULT,
            ),
            batch_size: ensure_usize(
                "batch_size",
                self.batch_size,
                0,
                BATCH_SIZE_MAX,
                BATCH_SIZE_DEFAULT,
            ),
            base_retry_backoff: millis(ensure_in_range(
                "base_retry_backoff_ms",
                self.base_retry_backoff_ms,
                0,
                BASE_RETRY_BACKOFF_MS_MAX as i64,
                BASE_RETRY_BACKOFF_MS_DEFAULT as i64,
            )),
            max_retry_backoff: millis(ensure_in_range(
                "retry_backoff_ms",
                self.retry_backoff_ms,
                0,
                RETRY_BACKOFF_MS_MAX as i64,
                RETRY_BACKOFF_MS_DEFAULT as i64,
            )),
            linger: millis(ensure_in_range(
                "linger_ms",
                self.linger_ms,
                duration_ms(LINGER_TIME_MIN),
                duration_ms(LINGER_TIME_MAX),
                duration_ms(LINGER_TIME_DEFAULT),
            )),
            retries: ensure_usize("retries", self.retries, 0, RETRIES_MAX, RETRIES_DEFAULT),
            reserved_attempts: ensure_usize(
                "reserved_attempts",
                self.reserved_attempts,
                0,
                RESERVED_ATTEMPTS_MAX,
                RESERVED_ATTEMPTS_DEFAULT,
            ),
            block_sec: self.block_sec,
            no_retry_status_codes: self.no_retry_status_codes.iter().copied().collect(),
        }
    }
}

/// Returns `value` when it lies in `[min, max]`, `default` otherwise.
fn ensure_in_range(name: &str, value: i64, min: i64, max: i64, default: i64) -> i64 {
    if (min..=max).contains(&value) {
        value
    } else {
        warn!(
            "PRODUCER | {name} = {value} is outside [{min}, {max}], using default {default}"
        );
        default
    }
}

#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn ensure_usize(name: &str, value: i64, min: usize, max: usize, default: usize) -> usize {
    ensure_in_range(name, value, min as i64, max as i64, default as i64) as usize
}

#[allow(clippy::cast_sign_loss)]
fn millis(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn duration_ms(d: Duration) -> i64 {
    d.as_millis() as i64
}
