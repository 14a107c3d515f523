// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Public entry point of the pipeline.
//!
//! A [`Producer`] goes through `Stopped -> Started -> Closed`. Records are only
//! accepted while started. [`Producer::close`] delivers (or fails) everything
//! accepted so far before returning; [`Producer::force_close`] abandons it.
//!
//! # Example
//!
//! ```rust,ignore
//! let producer = Producer::new(ProducerConfig::default(), Arc::new(transport));
//! producer.start();
//! producer
//!     .send_log(RoutingKey::new("topic"), LogRecord::new(0).with_content("msg", "hi"), None)
//!     .await?;
//! producer.close().await;
//! ```

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::admission::{admit, AdmissionPolicy, ByteCounter};
use crate::callback::SharedCallback;
use crate::clock::{Clock, TokioClock};
use crate::config::{ProducerConfig, ProducerSettings};
use crate::constants::{INBOUND_QUEUE_CAPACITY, READY_QUEUE_CAPACITY};
use crate::dispatcher::{Dispatcher, Inbound};
use crate::error::{ProducerError, Result};
use crate::record::{LogRecord, RoutingKey};
use crate::retry_queue::RetryScheduler;
use crate::sender::Sender;
use crate::transport::Transport;
use crate::worker_pool::WorkerPool;

/// Tasks and handles that exist only while the producer is started.
struct Running {
    inbound: mpsc::Sender<Inbound>,
    dispatcher: Arc<Dispatcher>,
    sender: Arc<Sender>,
    consumer: JoinHandle<()>,
    ticker: JoinHandle<()>,
    workers: WorkerPool,
}

enum Lifecycle {
    Stopped,
    Started(Running),
    Closed,
}

pub struct Producer {
    settings: Arc<ProducerSettings>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    counter: Arc<ByteCounter>,
    retry_queue: Arc<RetryScheduler>,
    state: Mutex<Lifecycle>,
    shutdown: CancellationToken,
    force: CancellationToken,
}

impl Producer {
    #[must_use]
    pub fn new(config: ProducerConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_clock(config, transport, Arc::new(TokioClock))
    }

    #[must_use]
    pub fn with_clock(
        config: ProducerConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Producer {
            settings: Arc::new(config.normalized()),
            transport,
            clock,
            counter: Arc::new(ByteCounter::new()),
            retry_queue: Arc::new(RetryScheduler::new()),
            state: Mutex::new(Lifecycle::Stopped),
            shutdown: CancellationToken::new(),
            force: CancellationToken::new(),
        }
    }

    /// Spawns the dispatcher and sender tasks on the current Tokio runtime.
    ///
    /// Calling it twice, or after a close, only logs a warning.
    pub fn start(&self) {
        let mut state = self.state.lock();
        match *state {
            Lifecycle::Stopped => {}
            Lifecycle::Started(_) => {
                warn!("PRODUCER | Producer already started");
                return;
            }
            Lifecycle::Closed => {
                warn!("PRODUCER | Producer is closed and cannot be restarted");
                return;
            }
        }

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
        let (ready_tx, ready_rx) = async_channel::bounded(READY_QUEUE_CAPACITY);

        let sender = Arc::new(Sender::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.retry_queue),
            Arc::clone(&self.counter),
            Arc::clone(&self.settings),
            Arc::clone(&self.clock),
            self.shutdown.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            &self.settings,
            Arc::clone(&self.retry_queue),
            ready_tx,
            Arc::clone(&self.clock),
            self.shutdown.clone(),
            self.force.clone(),
        ));

        let workers = WorkerPool::spawn(
            self.settings.sender_count,
            ready_rx,
            Arc::clone(&sender),
            self.force.clone(),
        );
        let consumer = tokio::spawn(Arc::clone(&dispatcher).run_consumer(inbound_rx));
        let ticker = tokio::spawn(Arc::clone(&dispatcher).run_ticker());

        info!(
            "PRODUCER | Started with {} sender(s), batch limits {} records / {} bytes, linger {:?}",
            self.settings.sender_count,
            self.settings.batch_count,
            self.settings.batch_size,
            self.settings.linger
        );
        *state = Lifecycle::Started(Running {
            inbound: inbound_tx,
            dispatcher,
            sender,
            consumer,
            ticker,
            workers,
        });
    }

    fn inbound(&self) -> Result<mpsc::Sender<Inbound>> {
        match &*self.state.lock() {
            Lifecycle::Started(running) => Ok(running.inbound.clone()),
            Lifecycle::Stopped => Err(ProducerError::NotStarted),
            Lifecycle::Closed => Err(ProducerError::Closed),
        }
    }

    async fn admit(&self) -> Result<()> {
        admit(
            &self.counter,
            self.settings.total_size_in_bytes,
            AdmissionPolicy::from_block_sec(self.settings.block_sec),
            &self.shutdown,
        )
        .await
    }

    async fn enqueue(
        &self,
        inbound: &mpsc::Sender<Inbound>,
        key: RoutingKey,
        record: LogRecord,
        callback: Option<SharedCallback>,
    ) -> Result<()> {
        if self.force.is_cancelled() {
            return Err(ProducerError::Closed);
        }
        let size = record.encoded_size();
        self.counter.add(size);
        let item = Inbound {
            key,
            record,
            callback,
        };
        if inbound.send(item).await.is_err() {
            // A forced close has already reset the counter.
            if !self.force.is_cancelled() {
                self.counter.sub(size);
            }
            return Err(ProducerError::Closed);
        }
        Ok(())
    }

    /// Submits one record. `callback` fires once with the outcome of the
    /// batch the record ends up in.
    pub async fn send_log(
        &self,
        key: RoutingKey,
        record: LogRecord,
        callback: Option<SharedCallback>,
    ) -> Result<()> {
        let inbound = self.inbound()?;
        self.admit().await?;
        self.enqueue(&inbound, key, record, callback).await
    }

    /// Submits several records for the same key. Admission is checked once
    /// for the whole slice; `callback` is attached to every record.
    pub async fn send_logs(
        &self,
        key: RoutingKey,
        records: Vec<LogRecord>,
        callback: Option<SharedCallback>,
    ) -> Result<()> {
        let inbound = self.inbound()?;
        self.admit().await?;
        for record in records {
            self.enqueue(&inbound, key.clone(), record, callback.clone())
                .await?;
        }
        Ok(())
    }

    /// Stops accepting records and waits until every accepted record has
    /// reached a terminal outcome. Failed sends are not retried once closing
    /// has begun.
    pub async fn close(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), Lifecycle::Closed);
        let running = match previous {
            Lifecycle::Started(running) => running,
            Lifecycle::Stopped => {
                debug!("PRODUCER | Closing a producer that was never started");
                return;
            }
            Lifecycle::Closed => {
                warn!("PRODUCER | Producer already closed");
                return;
            }
        };
        info!("PRODUCER | Closing, draining pending batches");

        let Running {
            inbound,
            dispatcher,
            sender,
            consumer,
            ticker,
            workers,
        } = running;
        drop(inbound);
        self.shutdown.cancel();

        for (name, handle) in [("consumer", consumer), ("ticker", ticker)] {
            if let Err(e) = handle.await {
                error!("PRODUCER | Dispatcher {} task failed: {}", name, e);
            }
        }
        dispatcher.drain().await;
        workers.join().await;

        // A send that failed just before shutdown may have rescheduled its
        // batch after the drain.
        for batch in self.retry_queue.drain_all() {
            sender.fail(batch);
        }

        self.counter.reset();
        info!("PRODUCER | Closed");
    }

    /// Stops every task immediately. Queued and in-flight batches are dropped
    /// without invoking their callbacks.
    pub fn force_close(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), Lifecycle::Closed);
        self.shutdown.cancel();
        self.force.cancel();
        if let Lifecycle::Started(running) = previous {
            running.workers.detach();
        }
        self.counter.reset();
        info!("PRODUCER | Force closed");
    }

    /// Bytes accepted and not yet delivered or failed.
    #[must_use]
    pub fn pending_bytes(&self) -> i64 {
        self.counter.get()
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        matches!(*self.state.lock(), Lifecycle::Started(_))
    }

    #[must_use]
    pub fn settings(&self) -> &ProducerSettings {
        &self.settings
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        if self.is_started() {
            warn!("PRODUCER | Producer dropped without close, abandoning pending batches");
            self.shutdown.cancel();
            self.force.cancel();
        }
    }
}
