//! Opaque unique tokens assigned at creation time.
//!
//! `RuleId` is assigned by a rule store on insert; `WorkerUid` is assigned by
//! the controller when it spawns a worker process. Neither participates in
//! equality/hashing for the types that carry them (see `axon-protocol`).

use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Opaque identity for a `ServerRule`/`ClientRule`, assigned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(Ulid);

impl RuleId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identity for a worker process, assigned by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerUid(Ulid);

impl WorkerUid {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for WorkerUid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
