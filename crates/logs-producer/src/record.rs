// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log records and the routing key used to bucket them into batches.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator used when rendering a [`RoutingKey`]. Fields may contain it, so
/// the rendered form is not unique and never identifies a batch.
const KEY_DELIMITER: char = '|';

/// Fixed per-record overhead for the timestamp.
const TIMESTAMP_SIZE_BYTES: usize = 8;

/// Per-content framing overhead (tag + length prefixes for key and value).
const CONTENT_OVERHEAD_BYTES: usize = 4;

/// Identifies the batch a record belongs to.
///
/// Two records share a batch only when every component matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingKey {
    pub topic_id: String,
    pub shard_hash: Option<String>,
    pub source: Option<String>,
    pub filename: Option<String>,
    pub context_flow: Option<String>,
}

impl RoutingKey {
    #[must_use]
    pub fn new(topic_id: impl Into<String>) -> Self {
        Self {
            topic_id: topic_id.into(),
            ..Default::default()
        }
    }

    /// Sets the shard hash hint. An empty hash means "no hint".
    #[must_use]
    pub fn with_shard_hash(mut self, shard_hash: impl Into<String>) -> Self {
        let shard_hash = shard_hash.into();
        self.shard_hash = (!shard_hash.is_empty()).then_some(shard_hash);
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    #[must_use]
    pub fn with_context_flow(mut self, context_flow: impl Into<String>) -> Self {
        self.context_flow = Some(context_flow.into());
        self
    }

    /// Flattened form for logs and display. Batches are keyed by the
    /// [`RoutingKey`] itself.
    #[must_use]
    pub fn bucket(&self) -> String {
        let parts = [
            self.topic_id.as_str(),
            self.shard_hash.as_deref().unwrap_or_default(),
            self.source.as_deref().unwrap_or_default(),
            self.filename.as_deref().unwrap_or_default(),
            self.context_flow.as_deref().unwrap_or_default(),
        ];
        let mut bucket = String::with_capacity(parts.iter().map(|p| p.len() + 1).sum());
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                bucket.push(KEY_DELIMITER);
            }
            bucket.push_str(part);
        }
        bucket
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.bucket())
    }
}

/// One key/value pair of a log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogContent {
    pub key: String,
    pub value: String,
}

/// A single log line.
///
/// `time` is kept exactly as supplied; it may be in seconds, milliseconds or
/// nanoseconds, and zero or negative means "now". Normalization is done by
/// the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub time: i64,
    pub contents: Vec<LogContent>,
}

impl LogRecord {
    #[must_use]
    pub fn new(time: i64) -> Self {
        Self {
            time,
            contents: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_content(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.contents.push(LogContent {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Estimated encoded size in bytes. All batch and memory accounting uses
    /// this value.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        TIMESTAMP_SIZE_BYTES
            + self
                .contents
                .iter()
                .map(|c| c.key.len() + c.value.len() + CONTENT_OVERHEAD_BYTES)
                .sum::<usize>()
    }
}

impl<K, V> FromIterator<(K, V)> for LogRecord
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            time: 0,
            contents: iter
                .into_iter()
                .map(|(key, value)| LogContent {
                    key: key.into(),
                    value: value.into(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_joins_all_parts() {
        let key = RoutingKey::new("topic-1")
            .with_shard_hash("abc")
            .with_source("10.0.0.1")
            .with_filename("app.log")
            .with_context_flow("flow");
        assert_eq!(key.bucket(), "topic-1|abc|10.0.0.1|app.log|flow");
    }

    #[test]
    fn test_bucket_with_missing_parts() {
        let key = RoutingKey::new("topic-1").with_filename("app.log");
        assert_eq!(key.bucket(), "topic-1|||app.log|");
    }

    #[test]
    fn test_empty_shard_hash_is_absent() {
        let key = RoutingKey::new("t").with_shard_hash("");
        assert_eq!(key.shard_hash, None);
        assert_eq!(key, RoutingKey::new("t"));
    }

    #[test]
    fn test_distinct_keys_have_distinct_buckets() {
        let a = RoutingKey::new("t").with_source("a");
        let b = RoutingKey::new("t").with_filename("a");
        assert_ne!(a.bucket(), b.bucket());
    }

    #[test]
    fn test_keys_with_colliding_buckets_are_distinct() {
        let a = RoutingKey::new("t").with_source("a|b").with_filename("c");
        let b = RoutingKey::new("t").with_source("a").with_filename("b|c");
        assert_eq!(a.bucket(), b.bucket());
        assert_ne!(a, b);
    }

    #[test]
    fn test_encoded_size() {
        let record = LogRecord::new(1).with_content("k", "value");
        assert_eq!(record.encoded_size(), 8 + 1 + 5 + 4);
        assert_eq!(LogRecord::new(1).encoded_size(), 8);
    }

    #[test]
    fn test_record_from_pairs() {
        let record: LogRecord = [("level", "info"), ("msg", "hello")].into_iter().collect();
        assert_eq!(record.contents.len(), 2);
        assert_eq!(record.contents[1].value, "hello");
    }
}
