// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Grouping of inbound records into batches.
//!
//! The dispatcher runs two tasks sharing the open-batch map:
//!
//! ```text
//!   callers ──> inbound queue ──> consumer ──┐
//!                                            │ flush on size / count
//!                                            v
//!                      ┌──────────────> ready queue ──> workers
//!                      │                     ^
//!   ticker (100ms) ────┤ flush on linger     │
//!                      └── due retries ──────┘
//! ```
//!
//! The map lock is never held across an `.await`: flushed batches are
//! collected under the lock and pushed to the ready queue after releasing it.

use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::batch::{Batch, BatchId};
use crate::callback::SharedCallback;
use crate::clock::Clock;
use crate::config::ProducerSettings;
use crate::constants::{BATCH_SIZE_MAX, TICK_INTERVAL};
use crate::record::{LogRecord, RoutingKey};
use crate::retry_queue::RetryScheduler;

/// A record on its way from a caller to the dispatcher.
#[derive(Clone)]
pub struct Inbound {
    pub key: RoutingKey,
    pub record: LogRecord,
    pub callback: Option<SharedCallback>,
}

/// Open batches, one per routing key.
pub struct OpenBatches {
    batches: HashMap<RoutingKey, Batch>,
    next_id: BatchId,
    batch_size_limit: usize,
    batch_count_limit: usize,
    reserved_attempts: usize,
}

impl OpenBatches {
    #[must_use]
    pub fn new(batch_size_limit: usize, batch_count_limit: usize, reserved_attempts: usize) -> Self {
        Self {
            batches: HashMap::new(),
            next_id: 0,
            batch_size_limit,
            batch_count_limit,
            reserved_attempts,
        }
    }

    fn open(
        &mut self,
        key: RoutingKey,
        record: LogRecord,
        callback: Option<SharedCallback>,
        now: Instant,
    ) -> Batch {
        let id = self.next_id;
        self.next_id += 1;
        Batch::new(id, key, record, callback, now, self.reserved_attempts)
    }

    /// Places `item` into the batch of its key and returns the batch that
    /// became ready as a result, if any.
    ///
    /// A batch already past the soft size limit (but under the hard cap) still
    /// takes this record and is flushed right after. Otherwise the record is
    /// appended while both limits hold, or starts a new batch once they don't.
    pub fn add(&mut self, item: Inbound, now: Instant) -> Option<Batch> {
        let Inbound {
            key,
            record,
            callback,
        } = item;
        let Some(batch) = self.batches.get_mut(&key) else {
            let batch = self.open(key.clone(), record, callback, now);
            self.batches.insert(key, batch);
            return None;
        };

        let current_size = batch.size_bytes();
        let count_after = batch.record_count() + 1;
        let fits_count = count_after <= self.batch_count_limit;

        if current_size > self.batch_size_limit && current_size < BATCH_SIZE_MAX && fits_count {
            batch.append(record);
            if let Some(cb) = callback {
                batch.attach_callback(cb);
            }
            return self.batches.remove(&key);
        }

        if current_size <= self.batch_size_limit && fits_count {
            batch.append(record);
            if let Some(cb) = callback {
                batch.attach_callback(cb);
            }
            return None;
        }

        let fresh = self.open(key.clone(), record, callback, now);
        self.batches.insert(key, fresh)
    }

    /// Removes every batch open for at least `linger` and returns them with
    /// the shortest remaining linger among the batches left (`linger` when
    /// none are left).
    pub fn take_expired(&mut self, now: Instant, linger: Duration) -> (Vec<Batch>, Duration) {
        let mut remaining = linger;
        let expired: Vec<Batch> = self
            .batches
            .extract_if(|_, batch| {
                let age = batch.age(now);
                if age >= linger {
                    true
                } else {
                    remaining = remaining.min(linger - age);
                    false
                }
            })
            .map(|(_, batch)| batch)
            .collect();
        (expired, remaining)
    }

    pub fn take_all(&mut self) -> Vec<Batch> {
        self.batches.drain().map(|(_, batch)| batch).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

pub struct Dispatcher {
    open: Mutex<OpenBatches>,
    retry_queue: Arc<RetryScheduler>,
    ready: async_channel::Sender<Batch>,
    linger: Duration,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
    force: CancellationToken,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        settings: &ProducerSettings,
        retry_queue: Arc<RetryScheduler>,
        ready: async_channel::Sender<Batch>,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
        force: CancellationToken,
    ) -> Self {
        Dispatcher {
            open: Mutex::new(OpenBatches::new(
                settings.batch_size,
                settings.batch_count,
                settings.reserved_attempts,
            )),
            retry_queue,
            ready,
            linger: settings.linger,
            clock,
            shutdown,
            force,
        }
    }

    /// Hands a batch to the workers. Returns `false` if the batch was dropped
    /// because of a forced close or a closed ready queue.
    async fn push_ready(&self, batch: Batch) -> bool {
        let id = batch.id();
        tokio::select! {
            biased;
            () = self.force.cancelled() => {
                debug!("PRODUCER | Abandoning batch {id} on forced close");
                false
            }
            sent = self.ready.send(batch) => match sent {
                Ok(()) => true,
                Err(_) => {
                    warn!("PRODUCER | Ready queue closed, dropping batch {id}");
                    false
                }
            },
        }
    }

    async fn accept(&self, item: Inbound) -> bool {
        let flushed = self.open.lock().add(item, self.clock.now());
        match flushed {
            Some(batch) => self.push_ready(batch).await,
            None => true,
        }
    }

    /// Consumes inbound records until shutdown, then drains what was already
    /// queued and closes the inbound queue so blocked callers are released.
    pub async fn run_consumer(self: Arc<Self>, mut inbound: mpsc::Receiver<Inbound>) {
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                item = inbound.recv() => match item {
                    Some(item) => {
                        if !self.accept(item).await {
                            return;
                        }
                    }
                    None => break,
                },
            }
        }

        inbound.close();
        while let Some(item) = inbound.recv().await {
            if self.force.is_cancelled() || !self.accept(item).await {
                return;
            }
        }
        debug!("PRODUCER | Dispatcher consumer stopped");
    }

    /// Flushes lingering batches and resubmits due retries until shutdown.
    pub async fn run_ticker(self: Arc<Self>) {
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                () = tokio::time::sleep(TICK_INTERVAL) => {}
            }

            let now = self.clock.now();
            let (expired, mut budget) = self.open.lock().take_expired(now, self.linger);
            for batch in expired {
                debug!(
                    "PRODUCER | Batch {} lingered for {:?}, flushing",
                    batch.id(),
                    batch.age(now)
                );
                if !self.push_ready(batch).await {
                    return;
                }
            }

            let due = self.retry_queue.pop_due(self.clock.now());
            if due.is_empty() {
                if let Some(next) = self.retry_queue.next_due() {
                    budget = budget.min(next.saturating_duration_since(self.clock.now()));
                }
                tokio::select! {
                    biased;
                    () = self.shutdown.cancelled() => break,
                    () = tokio::time::sleep(budget) => {}
                }
            } else {
                for batch in due {
                    if !self.push_ready(batch).await {
                        return;
                    }
                }
            }
        }
        debug!("PRODUCER | Dispatcher ticker stopped");
    }

    /// Flushes every open batch and every pending retry, then closes the
    /// ready queue. Call once both loops have stopped.
    pub async fn drain(&self) {
        let open = self.open.lock().take_all();
        let retries = self.retry_queue.drain_all();
        debug!(
            "PRODUCER | Draining {} open batch(es) and {} pending retry(ies)",
            open.len(),
            retries.len()
        );
        for batch in open.into_iter().chain(retries) {
            if !self.push_ready(batch).await {
                break;
            }
        }
        self.ready.close();
    }

    #[must_use]
    pub fn open_batches(&self) -> usize {
        self.open.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, TokioClock};

    fn item(key: &str, value: &str) -> Inbound {
        Inbound {
            key: RoutingKey::new(key),
            record: LogRecord::new(1).with_content("msg", value),
            callback: None,
        }
    }

    fn record_size(value: &str) -> usize {
        LogRecord::new(1).with_content("msg", value).encoded_size()
    }

    #[test]
    fn test_records_of_one_key_coalesce_under_limits() {
        let mut open = OpenBatches::new(1024, 10, 1);
        let now = Instant::now();
        for i in 0..5 {
            assert!(open.add(item("k", &i.to_string()), now).is_none());
        }
        assert!(open.add(item("other", "x"), now).is_none());
        assert_eq!(open.len(), 2);

        let all = open.take_all();
        let counts: Vec<usize> = {
            let mut c: Vec<usize> = all.iter().map(Batch::record_count).collect();
            c.sort_unstable();
            c
        };
        assert_eq!(counts, vec![1, 5]);
    }

    #[test]
    fn test_keys_with_delimiter_in_fields_stay_apart() {
        let mut open = OpenBatches::new(1024, 10, 1);
        let now = Instant::now();
        let first = RoutingKey::new("t").with_source("a|b").with_filename("c");
        let second = RoutingKey::new("t").with_source("a").with_filename("b|c");
        assert_eq!(first.bucket(), second.bucket());

        for key in [first.clone(), second.clone()] {
            let inbound = Inbound {
                key,
                record: LogRecord::new(1).with_content("msg", "v"),
                callback: None,
            };
            assert!(open.add(inbound, now).is_none());
        }
        assert_eq!(open.len(), 2);

        let all = open.take_all();
        assert_eq!(all.len(), 2);
        for batch in &all {
            assert_eq!(batch.record_count(), 1);
        }
        assert!(all.iter().any(|b| *b.key() == first));
        assert!(all.iter().any(|b| *b.key() == second));
    }

    #[test]
    fn test_count_limit_flushes_existing_batch() {
        let mut open = OpenBatches::new(1024 * 1024, 2, 1);
        let now = Instant::now();
        assert!(open.add(item("k", "1"), now).is_none());
        assert!(open.add(item("k", "2"), now).is_none());

        let flushed = open.add(item("k", "3"), now).expect("count limit reached");
        assert_eq!(flushed.record_count(), 2);
        assert_eq!(open.len(), 1);
        assert_eq!(open.take_all()[0].record_count(), 1);
    }

    #[test]
    fn test_over_soft_limit_takes_one_more_record_then_flushes() {
        let limit = record_size("aaaa");
        let mut open = OpenBatches::new(limit, 100, 1);
        let now = Instant::now();

        // At the limit: still appended without flushing.
        assert!(open.add(item("k", "aaaa"), now).is_none());
        assert!(open.add(item("k", "b"), now).is_none());

        // Now over the limit: the record is appended, then the batch flushes.
        let flushed = open.add(item("k", "c"), now).expect("over soft limit");
        assert_eq!(flushed.record_count(), 3);
        assert!(flushed.size_bytes() > limit);
        assert!(open.is_empty());
    }

    #[test]
    fn test_batch_at_hard_cap_is_flushed_before_append() {
        let big = "x".repeat(BATCH_SIZE_MAX);
        let mut open = OpenBatches::new(1024, 100, 1);
        let now = Instant::now();
        assert!(open.add(item("k", &big), now).is_none());

        let flushed = open.add(item("k", "small"), now).expect("hard cap reached");
        assert_eq!(flushed.record_count(), 1);
        assert_eq!(open.len(), 1);
    }

    #[test]
    fn test_take_expired_reports_remaining_linger() {
        let clock = ManualClock::new();
        let linger = Duration::from_millis(2000);
        let mut open = OpenBatches::new(1024, 10, 1);

        open.add(item("old", "1"), clock.now());
        clock.advance(Duration::from_millis(1500));
        open.add(item("new", "1"), clock.now());
        clock.advance(Duration::from_millis(600));

        let (expired, remaining) = open.take_expired(clock.now(), linger);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].key().topic_id, "old");
        assert_eq!(remaining, Duration::from_millis(1400));

        let (expired, remaining) = OpenBatches::new(1, 1, 1).take_expired(clock.now(), linger);
        assert!(expired.is_empty());
        assert_eq!(remaining, linger);
    }

    #[test]
    fn test_batch_ids_are_unique() {
        let mut open = OpenBatches::new(1024, 1, 1);
        let now = Instant::now();
        let mut ids = Vec::new();
        for i in 0..5 {
            if let Some(b) = open.add(item("k", &i.to_string()), now) {
                ids.push(b.id());
            }
        }
        ids.extend(open.take_all().iter().map(Batch::id));
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 5);
    }

    fn dispatcher(settings: &ProducerSettings) -> (Arc<Dispatcher>, async_channel::Receiver<Batch>) {
        let (tx, rx) = async_channel::bounded(100);
        let dispatcher = Dispatcher::new(
            settings,
            Arc::new(RetryScheduler::new()),
            tx,
            Arc::new(TokioClock),
            CancellationToken::new(),
            CancellationToken::new(),
        );
        (Arc::new(dispatcher), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_flush_then_linger_flush() {
        let settings = ProducerSettings {
            batch_count: 2,
            linger: Duration::from_secs(2),
            ..Default::default()
        };
        let (dispatcher, ready) = dispatcher(&settings);
        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(Arc::clone(&dispatcher).run_consumer(rx));
        tokio::spawn(Arc::clone(&dispatcher).run_ticker());

        tx.send(item("k", "1")).await.expect("send");
        tx.send(item("k", "2")).await.expect("send");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(ready.is_empty());
        assert_eq!(dispatcher.open_batches(), 1);

        tx.send(item("k", "3")).await.expect("send");
        let first = ready.recv().await.expect("count flush");
        assert_eq!(first.record_count(), 2);

        let opened = Instant::now();
        let second = ready.recv().await.expect("linger flush");
        assert_eq!(second.record_count(), 1);
        assert!(opened.elapsed() >= Duration::from_millis(1900));
        assert!(opened.elapsed() <= Duration::from_millis(2200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_resubmits_due_retries() {
        let settings = ProducerSettings::default();
        let (dispatcher, ready) = dispatcher(&settings);
        tokio::spawn(Arc::clone(&dispatcher).run_ticker());

        let mut batch = Batch::new(
            99,
            RoutingKey::new("k"),
            LogRecord::new(1),
            None,
            Instant::now(),
            1,
        );
        batch.schedule_retry(Duration::from_secs(1), Instant::now() + Duration::from_secs(1));
        dispatcher.retry_queue.schedule(batch);

        let start = Instant::now();
        let resubmitted = ready.recv().await.expect("retry resubmitted");
        assert_eq!(resubmitted.id(), 99);
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() <= Duration::from_millis(1300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drain_flushes_everything_and_closes_queue() {
        let settings = ProducerSettings::default();
        let (dispatcher, ready) = dispatcher(&settings);
        let (tx, rx) = mpsc::channel(100);
        for i in 0..3 {
            tx.send(item(&format!("k{i}"), "v")).await.expect("send");
        }

        let mut retry = Batch::new(50, RoutingKey::new("r"), LogRecord::new(1), None, Instant::now(), 1);
        retry.schedule_retry(Duration::from_secs(10), Instant::now() + Duration::from_secs(10));
        dispatcher.retry_queue.schedule(retry);

        dispatcher.shutdown.cancel();
        Arc::clone(&dispatcher).run_consumer(rx).await;
        assert!(tx.send(item("late", "v")).await.is_err());

        dispatcher.drain().await;
        let mut drained = Vec::new();
        while let Ok(batch) = ready.recv().await {
            drained.push(batch);
        }
        assert_eq!(drained.len(), 4);
        assert!(ready.is_closed());
    }
}
