use thiserror::Error;

use axon_rpc::RpcError;
use axon_store::StoreError;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("no worker owns rule {0}")]
    RuleNotFound(String),

    #[error("worker {0} is not registered")]
    WorkerNotFound(String),

    #[error("timed out waiting for worker rpc socket at {0}")]
    WorkerStartTimeout(std::path::PathBuf),
}
