//! `MetricKey -> Counter` cache and the reporter that periodically drains it
//! onto the exchange.

pub mod cache;
pub mod counter;
pub mod reporter;

pub use cache::MetricsCache;
pub use counter::Counter;
pub use reporter::{ExchangeReporter, MetricsBatch};
