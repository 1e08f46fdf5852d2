use thiserror::Error;

/// Client-side error taxonomy. `RuleConflict` has no variant
/// here: a duplicate `add_clients` call is a no-op, not an error
/// (`RuleCollection::add` is already idempotent by identity).
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("protocol error: server returned status {0}")]
    Protocol(u16),

    #[error("rule not found")]
    RuleNotFound,
}
