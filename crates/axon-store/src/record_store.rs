//! `RecordStore`: the record-store boundary. The external `trafficrecords`
//! table itself is out of scope; this trait and its in-memory double exist
//! because the `RecordStoreSubscriber` in `axon-exchange` needs a concrete
//! type to merge batches into.

use std::sync::Mutex;

use async_trait::async_trait;
use axon_protocol::{Protocol, TrafficRecord};

use crate::error::StoreError;

/// Query predicate over `(source, destination, port, protocol)`.
#[derive(Debug, Clone)]
pub struct RecordFilter {
    pub source: String,
    pub destination: String,
    pub port: u16,
    pub protocol: Protocol,
}

impl RecordFilter {
    fn matches(&self, record: &TrafficRecord) -> bool {
        self.source == record.source
            && self.destination == record.destination
            && self.port == record.port
            && self.protocol == record.protocol
    }
}

/// `[start_ts, end_ts]` window, inclusive. Default window is the last 300s.
#[derive(Debug, Clone, Copy)]
pub struct RecordWindow {
    pub start_ts: u64,
    pub end_ts: u64,
}

impl RecordWindow {
    pub const DEFAULT_WINDOW_SECS: u64 = 300;

    pub fn last_default(now: u64) -> Self {
        Self {
            start_ts: now.saturating_sub(Self::DEFAULT_WINDOW_SECS),
            end_ts: now,
        }
    }

    fn contains(&self, ts: u64) -> bool {
        ts >= self.start_ts && ts <= self.end_ts
    }
}

/// `SUM(success_count), SUM(failure_count)` over a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordAggregate {
    pub success_count: u64,
    pub failure_count: u64,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_batch(&self, records: Vec<TrafficRecord>) -> Result<(), StoreError>;

    async fn query(
        &self,
        filter: &RecordFilter,
        window: Option<RecordWindow>,
    ) -> Result<Vec<TrafficRecord>, StoreError>;

    async fn aggregate(
        &self,
        filter: &RecordFilter,
        window: Option<RecordWindow>,
    ) -> Result<RecordAggregate, StoreError>;
}

#[derive(Default)]
pub struct InMemoryRecordStore {
    records: Mutex<Vec<TrafficRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert_batch(&self, records: Vec<TrafficRecord>) -> Result<(), StoreError> {
        self.records
            .lock()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .extend(records);
        Ok(())
    }

    async fn query(
        &self,
        filter: &RecordFilter,
        window: Option<RecordWindow>,
    ) -> Result<Vec<TrafficRecord>, StoreError> {
        let records = self.records.lock().map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(records
            .iter()
            .filter(|r| filter.matches(r))
            .filter(|r| window.is_none_or(|w| w.contains(r.created_ts)))
            .cloned()
            .collect())
    }

    async fn aggregate(
        &self,
        filter: &RecordFilter,
        window: Option<RecordWindow>,
    ) -> Result<RecordAggregate, StoreError> {
        let matching = self.query(filter, window).await?;
        Ok(matching.iter().fold(RecordAggregate::default(), |mut acc, r| {
            acc.success_count += r.success_count;
            acc.failure_count += r.failure_count;
            acc
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(success: u64, failure: u64, created_ts: u64) -> TrafficRecord {
        let mut r = TrafficRecord::new("src", "dst", 80, Protocol::Tcp, true, created_ts);
        r.success_count = success;
        r.failure_count = failure;
        r
    }

    fn filter() -> RecordFilter {
        RecordFilter {
            source: "src".to_string(),
            destination: "dst".to_string(),
            port: 80,
            protocol: Protocol::Tcp,
        }
    }

    #[tokio::test]
    async fn aggregate_sums_matching_records_in_window() {
        let store = InMemoryRecordStore::new();
        store
            .insert_batch(vec![record(3, 1, 100), record(2, 0, 200), record(1, 1, 1000)])
            .await
            .unwrap();

        let aggregate = store
            .aggregate(&filter(), Some(RecordWindow { start_ts: 0, end_ts: 500 }))
            .await
            .unwrap();

        assert_eq!(aggregate, RecordAggregate { success_count: 5, failure_count: 1 });
    }

    #[tokio::test]
    async fn aggregate_without_window_covers_all_records() {
        let store = InMemoryRecordStore::new();
        store
            .insert_batch(vec![record(3, 1, 100), record(1, 1, 1_000_000)])
            .await
            .unwrap();

        let aggregate = store.aggregate(&filter(), None).await.unwrap();
        assert_eq!(aggregate, RecordAggregate { success_count: 4, failure_count: 2 });
    }
}
