// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the producer pipeline.
//!
//! Only [`ProducerError`] ever reaches a caller of the producer. Send failures
//! ([`SendError`]) stay inside the pipeline: they are recorded as attempts on
//! the batch and routed to a retry or to the failure callbacks.

use thiserror::Error;

/// Convenience alias for results returned by the producer facade.
pub type Result<T> = std::result::Result<T, ProducerError>;

/// Errors surfaced synchronously to callers of the producer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProducerError {
    /// Outstanding unsent bytes stayed above `total_size_in_bytes` for the
    /// whole `block_sec` budget (or immediately, when `block_sec` is zero).
    #[error(
        "accumulated log size exceeded total_size_in_bytes ({limit} bytes) and the wait exceeded block_sec"
    )]
    AdmissionTimeout { limit: i64 },

    /// The producer has not been started yet.
    #[error("producer is not started")]
    NotStarted,

    /// The producer has been closed and no longer accepts records.
    #[error("producer is closed")]
    Closed,

    /// Configuration could not be parsed.
    #[error("invalid producer configuration: {0}")]
    InvalidConfig(String),
}

/// Failure reported by the remote log service or the network layer.
#[derive(Debug, Error, Clone, PartialEq, Eq, Default)]
#[error("transport error (status: {status_code:?}, code: {code}, request id: {request_id}): {message}")]
pub struct TransportError {
    /// HTTP status code, absent when the request never got a response.
    pub status_code: Option<u16>,
    pub code: String,
    pub message: String,
    pub request_id: String,
}

impl TransportError {
    #[must_use]
    pub fn new(
        status_code: Option<u16>,
        code: impl Into<String>,
        message: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            status_code,
            code: code.into(),
            message: message.into(),
            request_id: request_id.into(),
        }
    }
}

/// Outcome of a failed transport call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Unexpected failure while preparing or sending the batch, e.g. a
    /// serialization error. Treated as retryable.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SendError {
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            SendError::Transport(e) => e.status_code,
            SendError::Internal(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_timeout_message_mentions_limit() {
        let err = ProducerError::AdmissionTimeout { limit: 1024 };
        assert!(err.to_string().contains("1024"));
    }

    #[test]
    fn test_send_error_status_code() {
        let err = SendError::from(TransportError::new(Some(429), "Throttled", "slow down", "req-1"));
        assert_eq!(err.status_code(), Some(429));
        assert_eq!(SendError::Internal("boom".to_string()).status_code(), None);
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::new(Some(500), "InternalError", "oops", "req-9");
        let msg = err.to_string();
        assert!(msg.contains("InternalError"));
        assert!(msg.contains("req-9"));
        assert!(msg.contains("oops"));
    }
}
