//! Core data model shared by every `axon` binary: rule types, the rule
//! collection, the traffic record, the metric key codec, and the RPC wire
//! envelope.

pub mod collection;
pub mod error;
pub mod metric_key;
pub mod record;
pub mod rpc;
pub mod rules;

pub use collection::{RuleCollection, RuleNotFound};
pub use error::ProtocolError;
pub use metric_key::{MetricKey, Outcome};
pub use record::TrafficRecord;
pub use rpc::{RpcRequest, RpcResult};
pub use rules::{Allowance, ClientRule, Protocol, RuleIdentity, ServerRule};
