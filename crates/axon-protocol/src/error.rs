use thiserror::Error;

/// Errors surfaced while parsing or encoding protocol-level values (metric
/// keys, RPC frames). Transport-level failures live in `axon-rpc`.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed metric key '{0}'")]
    MalformedMetricKey(String),

    #[error("unknown protocol '{0}'")]
    UnknownProtocol(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("frame io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame exceeds maximum length ({0} bytes)")]
    FrameTooLarge(u32),
}
