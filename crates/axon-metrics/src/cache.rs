//! `MetricsCache`: a `MetricKey -> Counter` map with counters created on
//! first access.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axon_protocol::MetricKey;

use crate::counter::Counter;

#[derive(Default)]
pub struct MetricsCache {
    counters: Mutex<HashMap<MetricKey, Arc<Counter>>>,
}

impl MetricsCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter_for(&self, key: &MetricKey) -> Arc<Counter> {
        let mut counters = self.counters.lock().expect("metrics cache mutex poisoned");
        Arc::clone(
            counters
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Counter::new())),
        )
    }

    pub fn inc(&self, key: &MetricKey) {
        self.counter_for(key).inc();
    }

    pub fn dec(&self, key: &MetricKey, delta: u64) {
        self.counter_for(key).dec(delta);
    }

    /// Current count for `key`, `0` if the key has never been touched (no
    /// counter is created by a read).
    pub fn count(&self, key: &MetricKey) -> u64 {
        self.counters
            .lock()
            .expect("metrics cache mutex poisoned")
            .get(key)
            .map(|c| c.count())
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        for counter in self.counters.lock().expect("metrics cache mutex poisoned").values() {
            counter.clear();
        }
    }

    /// Snapshot every counter currently holding a non-zero value. Returns
    /// `(key, value)` pairs so the caller can later `dec` each key by the
    /// exact value drained, preserving increments that land in between.
    pub fn snapshot_nonzero(&self) -> Vec<(MetricKey, u64)> {
        self.counters
            .lock()
            .expect("metrics cache mutex poisoned")
            .iter()
            .filter_map(|(key, counter)| {
                let value = counter.count();
                (value > 0).then(|| (key.clone(), value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_protocol::{Outcome, Protocol};

    fn key(port: u16) -> MetricKey {
        MetricKey::new("src", "dst", port, Protocol::Tcp, true, Outcome::Success)
    }

    #[test]
    fn counter_is_created_lazily_on_first_inc() {
        let cache = MetricsCache::new();
        assert_eq!(cache.count(&key(1)), 0);
        cache.inc(&key(1));
        assert_eq!(cache.count(&key(1)), 1);
    }

    #[test]
    fn snapshot_only_includes_nonzero_counters() {
        let cache = MetricsCache::new();
        cache.inc(&key(1));
        cache.inc(&key(2));
        cache.dec(&key(2), 1);

        let snapshot = cache.snapshot_nonzero();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].0, key(1));
        assert_eq!(snapshot[0].1, 1);
    }

    #[test]
    fn clear_zeroes_all_counters_without_removing_keys() {
        let cache = MetricsCache::new();
        cache.inc(&key(1));
        cache.clear();
        assert_eq!(cache.count(&key(1)), 0);
    }
}
