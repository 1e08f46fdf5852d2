//! `RecordStoreSubscriber`: merges a batch of per-`MetricKey` counts into
//! `TrafficRecord` rows and batch-inserts them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axon_common::ClockSource;
use axon_protocol::metric_key::Outcome;
use axon_protocol::TrafficRecord;
use axon_store::RecordStore;

use crate::error::SubscriberError;
use crate::subscriber::{Batch, Subscriber};

pub struct RecordStoreSubscriber {
    store: Arc<dyn RecordStore>,
    clock: ClockSource,
}

impl RecordStoreSubscriber {
    pub fn new(store: Arc<dyn RecordStore>, clock: ClockSource) -> Self {
        Self { store, clock }
    }
}

#[async_trait]
impl Subscriber for RecordStoreSubscriber {
    async fn handle(&self, batch: Batch) -> Result<(), SubscriberError> {
        if batch.is_empty() {
            return Ok(());
        }

        let now = self.clock.epoch_seconds();
        let mut rows: HashMap<(String, String, u16, axon_protocol::Protocol, bool), TrafficRecord> =
            HashMap::new();

        for (key, count) in batch {
            let row = rows
                .entry((key.source.clone(), key.destination.clone(), key.port, key.protocol, key.connected))
                .or_insert_with(|| {
                    TrafficRecord::new(key.source, key.destination, key.port, key.protocol, key.connected, now)
                });

            match key.outcome {
                Outcome::Success => row.success_count += count,
                Outcome::Failure => row.failure_count += count,
            }
        }

        self.store.insert_batch(rows.into_values().collect()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_protocol::{MetricKey, Protocol};
    use axon_store::InMemoryRecordStore;

    #[tokio::test]
    async fn merges_success_and_failure_counts_for_the_same_tuple() {
        let store = Arc::new(InMemoryRecordStore::new());
        let subscriber = RecordStoreSubscriber::new(store.clone(), ClockSource::default());

        let mut batch = Batch::new();
        batch.insert(
            MetricKey::new("s", "d", 80, Protocol::Tcp, true, Outcome::Success),
            5,
        );
        batch.insert(
            MetricKey::new("s", "d", 80, Protocol::Tcp, true, Outcome::Failure),
            2,
        );

        subscriber.handle(batch).await.unwrap();

        let rows = store
            .query(
                &axon_store::RecordFilter {
                    source: "s".to_string(),
                    destination: "d".to_string(),
                    port: 80,
                    protocol: Protocol::Tcp,
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].success_count, 5);
        assert_eq!(rows[0].failure_count, 2);
    }
}
