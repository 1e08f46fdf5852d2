//! `TrafficRecord`: a time-windowed aggregate row in the record store.

use axon_common::RuleId;
use serde::{Deserialize, Serialize};

use crate::rules::Protocol;

/// A time-windowed aggregate of probe outcomes for one
/// `(source, destination, port, protocol, connected)` tuple. Not a
/// per-probe log: two records sharing that tuple within the same reporting
/// window must be merged by the record-store subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficRecord {
    pub id: RuleId,
    pub source: String,
    pub destination: String,
    pub port: u16,
    pub protocol: Protocol,
    pub connected: bool,
    pub success_count: u64,
    pub failure_count: u64,
    pub created_ts: u64,
}

impl TrafficRecord {
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        port: u16,
        protocol: Protocol,
        connected: bool,
        created_ts: u64,
    ) -> Self {
        Self {
            id: RuleId::new(),
            source: source.into(),
            destination: destination.into(),
            port,
            protocol,
            connected,
            success_count: 0,
            failure_count: 0,
            created_ts,
        }
    }

    /// Whether `other` shares this record's merge key
    /// `(source, destination, port, protocol, connected)`.
    pub fn shares_merge_key(&self, other: &TrafficRecord) -> bool {
        self.source == other.source
            && self.destination == other.destination
            && self.port == other.port
            && self.protocol == other.protocol
            && self.connected == other.connected
    }

    /// Merge another record's counts into this one in place.
    pub fn merge(&mut self, other: &TrafficRecord) {
        self.success_count += other.success_count;
        self.failure_count += other.failure_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_adds_counts_of_matching_records() {
        let mut a = TrafficRecord::new("s", "d", 80, Protocol::Tcp, true, 1000);
        a.success_count = 3;
        a.failure_count = 1;

        let mut b = TrafficRecord::new("s", "d", 80, Protocol::Tcp, true, 1001);
        b.success_count = 2;
        b.failure_count = 0;

        assert!(a.shares_merge_key(&b));
        a.merge(&b);

        assert_eq!(a.success_count, 5);
        assert_eq!(a.failure_count, 1);
    }

    #[test]
    fn differing_connected_flag_is_not_a_merge_key_match() {
        let a = TrafficRecord::new("s", "d", 80, Protocol::Tcp, true, 1000);
        let b = TrafficRecord::new("s", "d", 80, Protocol::Tcp, false, 1000);
        assert!(!a.shares_merge_key(&b));
    }
}
