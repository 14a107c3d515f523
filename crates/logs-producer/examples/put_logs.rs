// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sends a handful of records to a `PutLogs` endpoint.
//!
//! ```text
//! LOG_ENDPOINT=http://127.0.0.1:8080 LOG_TOPIC_ID=my-topic RUST_LOG=debug \
//!     cargo run --example put_logs
//! ```

use logs_producer::{
    completion, HttpTransport, HttpTransportConfig, LogRecord, Producer, ProducerConfig,
    RoutingKey,
};
use std::env;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = format!("h2=off,hyper=off,rustls=off,{log_level}");

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let endpoint = env::var("LOG_ENDPOINT").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());
    let topic = env::var("LOG_TOPIC_ID").unwrap_or_else(|_| "example-topic".to_string());
    let config = match env::var("LOG_PRODUCER_CONFIG") {
        Ok(raw) => match ProducerConfig::from_json(&raw) {
            Ok(config) => config,
            Err(e) => {
                error!("{e}");
                return;
            }
        },
        Err(_) => ProducerConfig::default(),
    };

    let transport = Arc::new(HttpTransport::new(&HttpTransportConfig::new(endpoint)));
    let producer = Producer::new(config, transport);
    producer.start();

    let key = RoutingKey::new(topic).with_filename("example.log");
    let callback = completion(|result| {
        let request_id = result
            .attempts
            .last()
            .map(|a| a.request_id.as_str())
            .unwrap_or_default();
        info!(
            "delivered: {} after {} attempt(s), last request id {request_id}",
            result.success,
            result.attempts.len()
        );
    });

    for i in 0..10 {
        let record = LogRecord::new(0)
            .with_content("level", "info")
            .with_content("message", format!("example line {i}"));
        if let Err(e) = producer
            .send_log(key.clone(), record, Some(Arc::clone(&callback)))
            .await
        {
            error!("record {i} rejected: {e}");
        }
    }

    producer.close().await;
}
