//! Outcome classification.
//!
//! `connected` is set equal to the rule's `allowed` flag: an allow-rule
//! expects to connect, a deny-rule expects not to. `success = (raw_success
//! == connected)` in both branches, so `connected` carries no semantics
//! beyond inverting outcome classification for deny rules.

use axon_protocol::metric_key::Outcome;
use axon_protocol::rules::Allowance;

/// `raw_success` is the transport-level result. Returns the `connected`
/// tag and the classified `Outcome` to attach to the `MetricKey`.
pub fn classify(allowed: Allowance, raw_success: bool) -> (bool, Outcome) {
    let connected = allowed.is_allowed();
    let success = raw_success == connected;
    (connected, if success { Outcome::Success } else { Outcome::Failure })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_rule_succeeds_when_the_probe_connects() {
        let (connected, outcome) = classify(Allowance::Allow, true);
        assert!(connected);
        assert_eq!(outcome, Outcome::Success);
    }

    #[test]
    fn allow_rule_fails_when_the_probe_cannot_connect() {
        let (_, outcome) = classify(Allowance::Allow, false);
        assert_eq!(outcome, Outcome::Failure);
    }

    #[test]
    fn deny_rule_succeeds_when_the_probe_fails_to_connect() {
        let (connected, outcome) = classify(Allowance::Deny, false);
        assert!(!connected);
        assert_eq!(outcome, Outcome::Success);
    }

    #[test]
    fn deny_rule_fails_when_the_probe_unexpectedly_connects() {
        let (_, outcome) = classify(Allowance::Deny, true);
        assert_eq!(outcome, Outcome::Failure);
    }
}
