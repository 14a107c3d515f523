// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Completion callbacks and the result handed to them.

use std::fmt;
use std::sync::Arc;

/// One recorded send outcome of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub success: bool,
    pub request_id: String,
    pub error_code: String,
    pub error_message: String,
    /// Unix milliseconds at which the outcome was observed.
    pub timestamp_ms: i64,
}

impl Attempt {
    #[must_use]
    pub fn success(request_id: impl Into<String>, timestamp_ms: i64) -> Self {
        Self {
            success: true,
            request_id: request_id.into(),
            error_code: String::new(),
            error_message: String::new(),
            timestamp_ms,
        }
    }

    #[must_use]
    pub fn failure(
        request_id: impl Into<String>,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            success: false,
            request_id: request_id.into(),
            error_code: error_code.into(),
            error_message: error_message.into(),
            timestamp_ms,
        }
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "success: {}, request_id: {}, error_code: {}, error_message: {}, timestamp_ms: {}",
            self.success, self.request_id, self.error_code, self.error_message, self.timestamp_ms
        )
    }
}

/// What a callback sees once its batch reached a terminal state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerResult {
    pub success: bool,
    /// Earliest attempts of the batch, capped at `reserved_attempts`.
    pub attempts: Vec<Attempt>,
}

/// Receives the terminal outcome of every batch a record was part of.
///
/// Exactly one of the two methods is called per attached record, from a
/// sender task. Implementations must not block.
pub trait Callback: Send + Sync {
    fn on_success(&self, result: &ProducerResult);
    fn on_failure(&self, result: &ProducerResult);
}

/// Shared callback handle. The same callback may be attached to many records.
pub type SharedCallback = Arc<dyn Callback>;

/// Adapts a closure taking the result into a [`Callback`]. The closure is
/// called for both outcomes; `result.success` tells them apart.
pub struct CompletionFn<F>(F);

impl<F> Callback for CompletionFn<F>
where
    F: Fn(&ProducerResult) + Send + Sync,
{
    fn on_success(&self, result: &ProducerResult) {
        (self.0)(result);
    }

    fn on_failure(&self, result: &ProducerResult) {
        (self.0)(result);
    }
}

/// Wraps a closure into a [`SharedCallback`].
pub fn completion<F>(f: F) -> SharedCallback
where
    F: Fn(&ProducerResult) + Send + Sync + 'static,
{
    Arc::new(CompletionFn(f))
}
