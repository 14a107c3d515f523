// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Boundary between the pipeline and the remote log service.
//!
//! The sender hands each frozen batch to a [`Transport`] and classifies the
//! outcome. Implementations perform exactly one request per call; retrying is
//! the sender's job.

use async_trait::async_trait;

use crate::batch::Batch;
use crate::error::SendError;

pub mod http;

pub use http::{HttpTransport, HttpTransportConfig};

/// Acknowledgement of a delivered batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    pub request_id: String,
}

impl SendReceipt {
    #[must_use]
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers every record of `batch` to the batch's topic.
    async fn send(&self, batch: &Batch) -> Result<SendReceipt, SendError>;
}
