//! `ServerRule` and `ClientRule`: the declarative units the controller
//! shards across workers.
//!
//! Identity (for equality, hashing, and `rules_registry` keys) is a tuple
//! of the declarative fields, *not* the full struct — two rules with the
//! same identity tuple but different `id`s are the same rule for registry
//! purposes. `id` is carried for the rule store but deliberately excluded
//! from `PartialEq`/`Hash`.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use axon_common::RuleId;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Transport protocol a rule targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
    Udp,
    Http,
    Https,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Http => "http",
            Protocol::Https => "https",
        };
        f.write_str(s)
    }
}

impl FromStr for Protocol {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            other => Err(ProtocolError::UnknownProtocol(other.to_string())),
        }
    }
}

/// Identity tuple used for equality, hashing, and registry keys. Implemented
/// by `ServerRule` and `ClientRule`.
pub trait RuleIdentity: Clone {
    /// Stable key used for `rules_registry` entries: `"{type}_{rule_id}"`.
    fn rule_key(&self) -> String;

    /// Whether this rule should currently be executed.
    fn is_enabled(&self) -> bool;

    /// Flips the enabled flag in place (invariant 2: a disabled rule is
    /// never executed).
    fn set_enabled(&mut self, enabled: bool);
}

/// A declarative server: host `protocol` listeners on `endpoint:port`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRule {
    pub id: RuleId,
    pub endpoint: String,
    pub port: u16,
    pub protocol: Protocol,
    pub enabled: bool,
}

impl ServerRule {
    pub fn new(endpoint: impl Into<String>, port: u16, protocol: Protocol) -> Self {
        Self {
            id: RuleId::new(),
            endpoint: endpoint.into(),
            port,
            protocol,
            enabled: true,
        }
    }

    fn identity(&self) -> (&str, u16, Protocol) {
        (&self.endpoint, self.port, self.protocol)
    }
}

impl PartialEq for ServerRule {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for ServerRule {}

impl Hash for ServerRule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl RuleIdentity for ServerRule {
    fn rule_key(&self) -> String {
        format!("server_{}", self.id)
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

/// Whether a `ClientRule` expects its probes to succeed (`Allow`) or fail
/// (`Deny`) when connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Allowance {
    Allow,
    Deny,
}

impl Allowance {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Allowance::Allow)
    }
}

/// A declarative client: continuously probe `source -> destination:port`
/// over `protocol`, expecting the outcome named by `allowed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRule {
    pub id: RuleId,
    pub source: String,
    pub destination: String,
    pub port: u16,
    pub protocol: Protocol,
    pub allowed: Allowance,
    pub enabled: bool,
    pub request_count: u32,
}

impl ClientRule {
    /// `request_count` is clamped to a minimum of 1 per invariant 3.
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        port: u16,
        protocol: Protocol,
        allowed: Allowance,
        request_count: u32,
    ) -> Self {
        Self {
            id: RuleId::new(),
            source: source.into(),
            destination: destination.into(),
            port,
            protocol,
            allowed,
            enabled: true,
            request_count: request_count.max(1),
        }
    }

    fn identity(&self) -> (&str, &str, u16, Protocol, Allowance) {
        (
            &self.source,
            &self.destination,
            self.port,
            self.protocol,
            self.allowed,
        )
    }
}

impl PartialEq for ClientRule {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for ClientRule {}

impl Hash for ClientRule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl RuleIdentity for ClientRule {
    fn rule_key(&self) -> String {
        format!("client_{}", self.id)
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}
