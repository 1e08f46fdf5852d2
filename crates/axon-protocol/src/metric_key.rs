//! `MetricKey`: the canonical string encoding of a probe outcome.
//!
//! Format: `"{source}:{destination}:{port}:{protocol}:{connected}:{outcome}"`
//! where `outcome` is `success` or `failure`. This is the string consumed by
//! the metrics cache, the exchange, and the telemetry subscriber; it's
//! lossless, so `MetricKey::parse(key.to_string())` round-trips (Testable
//! Property 7).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::rules::Protocol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Failure,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        })
    }
}

impl FromStr for Outcome {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Outcome::Success),
            "failure" => Ok(Outcome::Failure),
            other => Err(ProtocolError::MalformedMetricKey(other.to_string())),
        }
    }
}

/// Structured fields behind a `MetricKey`'s canonical string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricKey {
    pub source: String,
    pub destination: String,
    pub port: u16,
    pub protocol: Protocol,
    pub connected: bool,
    pub outcome: Outcome,
}

impl MetricKey {
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        port: u16,
        protocol: Protocol,
        connected: bool,
        outcome: Outcome,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            port,
            protocol,
            connected,
            outcome,
        }
    }

    /// Parse a canonical `MetricKey` string back into structured form.
    pub fn parse(s: &str) -> Result<Self, ProtocolError> {
        let mut parts = s.splitn(6, ':');
        let err = || ProtocolError::MalformedMetricKey(s.to_string());

        let source = parts.next().ok_or_else(err)?.to_string();
        let destination = parts.next().ok_or_else(err)?.to_string();
        let port: u16 = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let protocol: Protocol = parts.next().ok_or_else(err)?.parse()?;
        let connected: bool = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let outcome: Outcome = parts.next().ok_or_else(err)?.parse()?;

        Ok(Self {
            source,
            destination,
            port,
            protocol,
            connected,
            outcome,
        })
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}",
            self.source, self.destination, self.port, self.protocol, self.connected, self.outcome
        )
    }
}

impl FromStr for MetricKey {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKey::parse(s)
    }
}
