// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `PutLogs` over HTTP.
//!
//! Sends a batch as an unsigned JSON document:
//!
//! ```text
//! POST {endpoint}/PutLogs?TopicId={topic}
//! x-tls-hashkey:     {shard hash}        (only when the key has one)
//! log-count:         {records}
//! earliest-log-time: {min time, ms}
//! latest-log-time:   {max time, ms}
//! ```
//!
//! Request signing and body compression are left to a fronting proxy.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error};

use crate::batch::Batch;
use crate::clock::{Clock, TokioClock};
use crate::error::{SendError, TransportError};
use crate::record::LogContent;
use crate::transport::{SendReceipt, Transport};

const REQUEST_ID_HEADER: &str = "x-tls-requestid";
const HASH_KEY_HEADER: &str = "x-tls-hashkey";
const LOG_COUNT_HEADER: &str = "log-count";
const EARLIEST_LOG_TIME_HEADER: &str = "earliest-log-time";
const LATEST_LOG_TIME_HEADER: &str = "latest-log-time";

/// Error code reported for non-200 responses.
const HTTP_REQUEST_ERROR: &str = "http request error";

/// Error code reported when no response was received.
const CONNECTION_ERROR: &str = "connection error";

#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Base URL of the log service, e.g. `https://tls-cn-beijing.volces.com`.
    pub endpoint: String,
    pub timeout: Duration,
    pub https_proxy: Option<String>,
}

impl HttpTransportConfig {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(30),
            https_proxy: None,
        }
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    clock: Box<dyn Clock>,
}

impl HttpTransport {
    #[must_use]
    pub fn new(config: &HttpTransportConfig) -> Self {
        Self::with_clock(config, Box::new(TokioClock))
    }

    #[must_use]
    pub fn with_clock(config: &HttpTransportConfig, clock: Box<dyn Clock>) -> Self {
        Self {
            client: get_client(config),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            clock,
        }
    }

    fn url(&self) -> String {
        format!("{}/PutLogs", self.endpoint)
    }
}

fn get_client(config: &HttpTransportConfig) -> reqwest::Client {
    match build_client(config, true) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "PRODUCER | Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match build_client(config, false) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "PRODUCER | Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client(
    config: &HttpTransportConfig,
    allow_proxy: bool,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut builder = reqwest::Client::builder()
        .timeout(config.timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));
    if allow_proxy {
        if let Some(proxy) = &config.https_proxy {
            builder = builder.proxy(reqwest::Proxy::https(proxy)?);
        }
    }
    Ok(builder.build()?)
}

#[derive(Serialize)]
struct PutLogsBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context_flow: Option<&'a str>,
    logs: Vec<LogEntry<'a>>,
}

#[derive(Serialize)]
struct LogEntry<'a> {
    time: i64,
    contents: &'a [LogContent],
}

/// Converts a caller-supplied timestamp to Unix milliseconds.
///
/// Zero or negative means "now". Otherwise the unit is inferred from the
/// magnitude: below 1e10 seconds, below 1e15 milliseconds, nanoseconds above.
#[must_use]
pub fn normalize_time(time: i64, now_millis: i64) -> i64 {
    if time <= 0 {
        now_millis
    } else if time < 10_000_000_000 {
        time * 1000
    } else if time < 1_000_000_000_000_000 {
        time
    } else {
        time / 1_000_000
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, batch: &Batch) -> Result<SendReceipt, SendError> {
        let key = batch.key();
        let now_millis = self.clock.unix_millis();
        let logs: Vec<LogEntry<'_>> = batch
            .records()
            .iter()
            .map(|r| LogEntry {
                time: normalize_time(r.time, now_millis),
                contents: &r.contents,
            })
            .collect();
        let earliest = logs.iter().map(|l| l.time).min().unwrap_or(now_millis);
        let latest = logs.iter().map(|l| l.time).max().unwrap_or(now_millis);

        let body = PutLogsBody {
            source: key.source.as_deref(),
            filename: key.filename.as_deref(),
            context_flow: key.context_flow.as_deref(),
            logs,
        };
        let payload =
            serde_json::to_vec(&body).map_err(|e| SendError::Internal(e.to_string()))?;

        let mut request = self
            .client
            .post(self.url())
            .query(&[("TopicId", key.topic_id.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(LOG_COUNT_HEADER, batch.record_count())
            .header(EARLIEST_LOG_TIME_HEADER, earliest)
            .header(LATEST_LOG_TIME_HEADER, latest)
            .body(payload);
        if let Some(hash) = &key.shard_hash {
            request = request.header(HASH_KEY_HEADER, hash.as_str());
        }

        let response = request.send().await.map_err(|e| {
            debug!("PRODUCER | PutLogs for topic {} failed: {}", key.topic_id, e);
            TransportError::new(None, CONNECTION_ERROR, e.to_string(), "")
        })?;

        let status = response.status();
        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if status == StatusCode::OK {
            return Ok(SendReceipt::new(request_id));
        }

        let message = response.text().await.unwrap_or_default();
        debug!(
            "PRODUCER | PutLogs for topic {} returned {}: {}",
            key.topic_id, status, message
        );
        Err(TransportError::new(
            Some(status.as_u16()),
            HTTP_REQUEST_ERROR,
            message,
            request_id,
        )
        .into())
    }
}
