//! `Exchange` / `ExchangeManager`: the named fan-out bus.
//!
//! The dispatch loop runs on a dedicated `tokio` current-thread runtime,
//! since the shipped `RecordStoreSubscriber` calls an `async_trait` store
//! method. A plain OS thread pumps the synchronous ingest channel into
//! each subscriber's async fan-out channel, since
//! `crossbeam_channel::Receiver::recv` is a blocking call that shouldn't
//! run on the async runtime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use axon_metrics::reporter::MetricsBatch;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::ExchangeError;
use crate::subscriber::{Batch, Subscriber};

/// Depth of the shared ingest queue between reporters and the dispatch
/// pump. `send` blocks once this is full.
const DEFAULT_INGEST_CAPACITY: usize = 1024;

/// Depth of each subscriber's fan-out channel. Once full, the pump logs a
/// `CapacityError` and drops the batch for that subscriber only.
const SUBSCRIBER_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

struct SubscriberEntry {
    tx: mpsc::Sender<MetricsBatch>,
}

struct ExchangeInner {
    ingest_tx: Sender<MetricsBatch>,
    subscribers: Mutex<HashMap<SubscriberId, SubscriberEntry>>,
    next_id: AtomicU64,
}

/// Cloneable handle used by producers (the `ExchangeReporter`) to send
/// batches, and by anyone who needs to attach or detach a subscriber.
#[derive(Clone)]
pub struct Exchange {
    inner: Arc<ExchangeInner>,
}

impl Exchange {
    pub fn send(&self, batch: MetricsBatch) -> Result<(), ExchangeError> {
        self.inner.ingest_tx.send(batch).map_err(|_| ExchangeError::Closed)
    }

    /// Attach a subscriber with the given buffer interval. Accumulated
    /// messages dispatch to `subscriber.handle` on a fresh task once that
    /// interval elapses and the subscriber has something buffered.
    pub fn attach(
        &self,
        subscriber: Arc<dyn Subscriber>,
        buffer_interval: Duration,
        runtime: &tokio::runtime::Handle,
    ) -> SubscriberId {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);

        self.inner
            .subscribers
            .lock()
            .expect("exchange subscriber map poisoned")
            .insert(id, SubscriberEntry { tx });

        runtime.spawn(run_subscriber_loop(id, subscriber, buffer_interval, rx));
        id
    }

    /// Stop delivering to `id`. Buffered-but-undelivered messages are
    /// dropped: closing the channel ends the subscriber's loop on its next
    /// poll without flushing whatever it had accumulated.
    pub fn detach(&self, id: SubscriberId) {
        self.inner
            .subscribers
            .lock()
            .expect("exchange subscriber map poisoned")
            .remove(&id);
    }
}

async fn run_subscriber_loop(
    id: SubscriberId,
    subscriber: Arc<dyn Subscriber>,
    buffer_interval: Duration,
    mut rx: mpsc::Receiver<MetricsBatch>,
) {
    let mut accumulated: Batch = HashMap::new();
    let mut interval = tokio::time::interval(buffer_interval);
    interval.tick().await; // first tick fires immediately; consume it up front

    loop {
        tokio::select! {
            maybe_batch = rx.recv() => {
                match maybe_batch {
                    Some(batch) => {
                        for (key, value) in batch.metrics {
                            *accumulated.entry(key).or_insert(0) += value;
                        }
                    }
                    None => {
                        debug!(subscriber = id.0, "subscriber detached, ending dispatch loop");
                        return;
                    }
                }
            }
            _ = interval.tick() => {
                if accumulated.is_empty() {
                    continue;
                }
                let batch = std::mem::take(&mut accumulated);
                let sub = Arc::clone(&subscriber);
                tokio::spawn(async move {
                    if let Err(e) = sub.handle(batch).await {
                        warn!(subscriber = id.0, error = %e, "subscriber handler failed");
                    }
                });
            }
        }
    }
}

/// Owns the dispatch runtime and the ingest pump thread.
pub struct ExchangeManager {
    exchange: Exchange,
    runtime: tokio::runtime::Runtime,
    pump_keep_running: Arc<AtomicBool>,
    pump_handle: Option<JoinHandle<()>>,
}

impl ExchangeManager {
    pub fn start() -> Self {
        Self::with_ingest_capacity(DEFAULT_INGEST_CAPACITY)
    }

    pub fn with_ingest_capacity(ingest_capacity: usize) -> Self {
        let (ingest_tx, ingest_rx) = crossbeam_channel::bounded(ingest_capacity);
        let inner = Arc::new(ExchangeInner {
            ingest_tx,
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        });
        let exchange = Exchange { inner: Arc::clone(&inner) };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .thread_name("axon-exchange-dispatch")
            .build()
            .expect("failed to build exchange dispatch runtime");

        let pump_keep_running = Arc::new(AtomicBool::new(true));
        let pump_handle = spawn_pump(Arc::clone(&inner), ingest_rx, Arc::clone(&pump_keep_running));

        Self {
            exchange,
            runtime,
            pump_keep_running,
            pump_handle: Some(pump_handle),
        }
    }

    pub fn exchange(&self) -> Exchange {
        self.exchange.clone()
    }

    pub fn handle(&self) -> tokio::runtime::Handle {
        self.runtime.handle().clone()
    }

    pub fn attach(&self, subscriber: Arc<dyn Subscriber>, buffer_interval: Duration) -> SubscriberId {
        self.exchange.attach(subscriber, buffer_interval, &self.handle())
    }

    pub fn detach(&self, id: SubscriberId) {
        self.exchange.detach(id);
    }

    pub fn stop(mut self) {
        self.pump_keep_running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.pump_handle.take() {
            let _ = handle.join();
        }
    }
}

fn spawn_pump(
    inner: Arc<ExchangeInner>,
    ingest_rx: Receiver<MetricsBatch>,
    keep_running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("axon-exchange-pump".to_string())
        .spawn(move || {
            while keep_running.load(Ordering::Relaxed) {
                match ingest_rx.recv_timeout(Duration::from_millis(500)) {
                    Ok(batch) => fan_out(&inner, batch),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!("exchange pump shutting down");
        })
        .expect("failed to spawn exchange pump thread")
}

fn fan_out(inner: &ExchangeInner, batch: MetricsBatch) {
    let subscribers = inner.subscribers.lock().expect("exchange subscriber map poisoned");
    for (id, entry) in subscribers.iter() {
        if entry.tx.try_send(batch.clone()).is_err() {
            warn!(subscriber = id.0, "exchange capacity exceeded, dropping batch for subscriber");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_protocol::{MetricKey, Outcome, Protocol};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    struct CountingSubscriber {
        received: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Subscriber for CountingSubscriber {
        async fn handle(&self, batch: Batch) -> Result<(), crate::error::SubscriberError> {
            self.received.fetch_add(batch.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn attached_subscriber_receives_a_sent_batch() {
        let manager = ExchangeManager::start();
        let received = Arc::new(AtomicUsize::new(0));
        let subscriber = Arc::new(CountingSubscriber { received: Arc::clone(&received) });

        manager.attach(subscriber, StdDuration::from_millis(50));

        let key = MetricKey::new("s", "d", 80, Protocol::Tcp, true, Outcome::Success);
        let mut metrics = HashMap::new();
        metrics.insert(key, 3u64);
        manager.exchange().send(MetricsBatch { metrics }).unwrap();

        std::thread::sleep(StdDuration::from_millis(300));
        assert_eq!(received.load(Ordering::SeqCst), 1);

        manager.stop();
    }

    struct SummingSubscriber {
        total: Arc<AtomicUsize>,
        invocations: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Subscriber for SummingSubscriber {
        async fn handle(&self, batch: Batch) -> Result<(), crate::error::SubscriberError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            let sum: u64 = batch.values().sum();
            self.total.fetch_add(sum as usize, Ordering::SeqCst);
            Ok(())
        }
    }

    /// One subscriber at `buffer_interval=1`, 100 `send()` calls within 2s:
    /// the subscriber sees exactly 100 messages total across at most 3
    /// invocations.
    #[test]
    fn hundred_sends_arrive_as_at_most_three_batches_totalling_a_hundred() {
        let manager = ExchangeManager::start();
        let total = Arc::new(AtomicUsize::new(0));
        let invocations = Arc::new(AtomicUsize::new(0));
        let subscriber = Arc::new(SummingSubscriber {
            total: Arc::clone(&total),
            invocations: Arc::clone(&invocations),
        });

        manager.attach(subscriber, StdDuration::from_secs(1));

        let key = MetricKey::new("s", "d", 80, Protocol::Tcp, true, Outcome::Success);
        let exchange = manager.exchange();
        for _ in 0..100 {
            let mut metrics = HashMap::new();
            metrics.insert(key.clone(), 1u64);
            exchange.send(MetricsBatch { metrics }).unwrap();
        }

        std::thread::sleep(StdDuration::from_millis(2_500));

        assert_eq!(total.load(Ordering::SeqCst), 100);
        assert!(
            invocations.load(Ordering::SeqCst) <= 3,
            "expected at most 3 batch deliveries, got {}",
            invocations.load(Ordering::SeqCst)
        );

        manager.stop();
    }

    #[test]
    fn detach_stops_further_delivery() {
        let manager = ExchangeManager::start();
        let received = Arc::new(AtomicUsize::new(0));
        let subscriber = Arc::new(CountingSubscriber { received: Arc::clone(&received) });

        let id = manager.attach(subscriber, StdDuration::from_millis(50));
        manager.detach(id);

        let key = MetricKey::new("s", "d", 80, Protocol::Tcp, true, Outcome::Success);
        let mut metrics = HashMap::new();
        metrics.insert(key, 1u64);
        manager.exchange().send(MetricsBatch { metrics }).unwrap();

        std::thread::sleep(StdDuration::from_millis(300));
        assert_eq!(received.load(Ordering::SeqCst), 0);

        manager.stop();
    }
}
