// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fixed set of tasks draining the ready queue into the [`Sender`].
//!
//! Workers stop when the ready queue is closed and empty, which is how a
//! graceful close lets them finish every queued batch. The force token makes
//! them exit at once, abandoning the batch in hand.

use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::batch::Batch;
use crate::sender::Sender;

pub struct WorkerPool {
    workers: JoinSet<()>,
}

impl WorkerPool {
    /// Spawns `count` workers on the current runtime.
    #[must_use]
    pub fn spawn(
        count: usize,
        ready: async_channel::Receiver<Batch>,
        sender: Arc<Sender>,
        force: CancellationToken,
    ) -> Self {
        let mut workers = JoinSet::new();
        for id in 0..count {
            workers.spawn(run_worker(
                id,
                ready.clone(),
                Arc::clone(&sender),
                force.clone(),
            ));
        }
        WorkerPool { workers }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Waits for every worker to exit.
    pub async fn join(mut self) {
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                error!("PRODUCER | Sender worker failed: {}", e);
            }
        }
    }

    /// Detaches the workers; they keep running until they observe the force
    /// token or a closed queue.
    pub fn detach(mut self) {
        self.workers.detach_all();
    }
}

async fn run_worker(
    id: usize,
    ready: async_channel::Receiver<Batch>,
    sender: Arc<Sender>,
    force: CancellationToken,
) {
    loop {
        let batch = tokio::select! {
            biased;
            () = force.cancelled() => break,
            next = ready.recv() => match next {
                Ok(batch) => batch,
                Err(_) => break,
            },
        };
        tokio::select! {
            biased;
            () = force.cancelled() => {
                debug!("PRODUCER | Worker {id} abandoning in-flight batch on forced close");
                break;
            }
            () = sender.handle(batch) => {}
        }
    }
    debug!("PRODUCER | Worker {id} stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::ByteCounter;
    use crate::callback::completion;
    use crate::clock::TokioClock;
    use crate::config::ProducerSettings;
    use crate::error::SendError;
    use crate::record::{LogRecord, RoutingKey};
    use crate::retry_queue::RetryScheduler;
    use crate::transport::{SendReceipt, Transport};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    struct SlowTransport(Duration);

    #[async_trait]
    impl Transport for SlowTransport {
        async fn send(&self, _batch: &Batch) -> Result<SendReceipt, SendError> {
            tokio::time::sleep(self.0).await;
            Ok(SendReceipt::new("ok"))
        }
    }

    fn sender(delay: Duration) -> Arc<Sender> {
        Arc::new(Sender::new(
            Arc::new(SlowTransport(delay)),
            Arc::new(RetryScheduler::new()),
            Arc::new(ByteCounter::new()),
            Arc::new(ProducerSettings::default()),
            Arc::new(TokioClock),
            CancellationToken::new(),
        ))
    }

    fn batch(id: u64, done: &Arc<AtomicUsize>) -> Batch {
        let done = Arc::clone(done);
        Batch::new(
            id,
            RoutingKey::new("topic"),
            LogRecord::new(1).with_content("k", "v"),
            Some(completion(move |_| {
                done.fetch_add(1, Ordering::SeqCst);
            })),
            Instant::now(),
            1,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_workers_drain_closed_queue() {
        let (tx, rx) = async_channel::bounded(16);
        let done = Arc::new(AtomicUsize::new(0));
        for id in 0..10 {
            tx.send(batch(id, &done)).await.expect("queue open");
        }
        tx.close();

        let pool = WorkerPool::spawn(3, rx, sender(Duration::from_millis(10)), CancellationToken::new());
        assert_eq!(pool.len(), 3);
        pool.join().await;

        assert_eq!(done.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_abandons_in_flight_batches() {
        let (tx, rx) = async_channel::bounded(16);
        let done = Arc::new(AtomicUsize::new(0));
        for id in 0..4 {
            tx.send(batch(id, &done)).await.expect("queue open");
        }

        let force = CancellationToken::new();
        let pool = WorkerPool::spawn(2, rx, sender(Duration::from_secs(60)), force.clone());
        tokio::time::sleep(Duration::from_secs(1)).await;
        force.cancel();
        pool.join().await;

        assert_eq!(done.load(Ordering::SeqCst), 0);
        assert_eq!(tx.len(), 2);
    }
}
