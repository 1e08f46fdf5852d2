//! `Subscriber`: the polymorphic fan-out target. The
//! platform ships two variants, [`crate::record_store::RecordStoreSubscriber`]
//! and [`crate::telemetry::TelemetrySubscriber`].

use std::collections::HashMap;

use async_trait::async_trait;
use axon_protocol::MetricKey;

use crate::error::SubscriberError;

/// One subscriber's accumulated batch: per-`MetricKey` counts merged since
/// the subscriber's last dispatch.
pub type Batch = HashMap<MetricKey, u64>;

#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn handle(&self, batch: Batch) -> Result<(), SubscriberError>;
}
