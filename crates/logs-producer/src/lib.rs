// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Logs Producer
//!
//! Client-side producer for a log-ingestion service. Callers submit individual
//! log records; the producer groups them per routing key into size, count and
//! time bounded batches, delivers the batches through a [`Transport`] with a
//! bounded number of concurrent senders, and retries failed sends with a
//! capped backoff.
//!
//! ## Pipeline
//!
//! ```text
//!   send_log ──> admission ──> inbound queue ──> dispatcher ──> ready queue
//!                                                   ^               │
//!                                                   │ tick          v
//!                                            retry scheduler <── workers ──> transport
//! ```
//!
//! - [`producer`]: lifecycle and admission control
//! - [`dispatcher`]: per-key batching, linger flush and retry resubmission
//! - [`sender`] and [`worker_pool`]: delivery and outcome classification
//! - [`retry_queue`]: batches waiting for their next attempt
//! - [`transport`]: the network boundary, with an HTTP implementation

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]
#![deny(clippy::all)]
#![deny(unused_extern_crates)]
#![allow(clippy::module_name_repetitions)]

pub mod admission;
pub mod batch;
pub mod callback;
pub mod clock;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod producer;
pub mod record;
pub mod retry_queue;
pub mod sender;
pub mod transport;
pub mod worker_pool;

pub use batch::Batch;
pub use callback::{completion, Attempt, Callback, ProducerResult, SharedCallback};
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{ProducerConfig, ProducerSettings};
pub use error::{ProducerError, Result, SendError, TransportError};
pub use producer::Producer;
pub use record::{LogContent, LogRecord, RoutingKey};
pub use transport::{HttpTransport, HttpTransportConfig, SendReceipt, Transport};
