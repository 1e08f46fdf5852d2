//! Shared functionality used by multiple crates in the `axon` workspace:
//! a clock abstraction, opaque id generation, and a logging bootstrap.

pub mod clock;
pub mod ids;
pub mod logging;

pub use clock::ClockSource;
pub use ids::{RuleId, WorkerUid};
