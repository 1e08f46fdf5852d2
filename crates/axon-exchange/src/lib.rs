//! The named fan-out bus that distributes drained metrics batches to
//! subscribers: a record-store writer and a telemetry line-protocol
//! writer.

pub mod error;
pub mod exchange;
pub mod record_store_subscriber;
pub mod subscriber;
pub mod telemetry_subscriber;

pub use error::{ExchangeError, SubscriberError};
pub use exchange::{Exchange, ExchangeManager, SubscriberId};
pub use record_store_subscriber::RecordStoreSubscriber;
pub use subscriber::{Batch, Subscriber};
pub use telemetry_subscriber::TelemetrySubscriber;
