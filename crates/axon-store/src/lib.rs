//! Async rule-store and record-store traits, plus in-memory doubles, for
//! the external relational stores (out of scope themselves; the trait
//! boundary and a concrete in-memory implementation are in scope since the
//! controller and the exchange's record-store subscriber need something to
//! call).

pub mod error;
pub mod record_store;
pub mod rule_store;

pub use error::StoreError;
pub use record_store::{InMemoryRecordStore, RecordAggregate, RecordFilter, RecordStore, RecordWindow};
pub use rule_store::{ClientRuleFilter, InMemoryRuleStore, RuleStore, ServerRuleFilter};
