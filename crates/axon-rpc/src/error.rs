use thiserror::Error;

/// Error taxonomy for the RPC layer.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("rpc transport io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("rpc frame error: {0}")]
    Protocol(#[from] axon_protocol::ProtocolError),

    #[error("remote handler error: {0}")]
    Remote(String),
}
