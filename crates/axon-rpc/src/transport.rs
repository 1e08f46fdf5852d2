//! `RpcTransport`: the seam a non-POSIX transport (a Windows named pipe,
//! say) would implement. The only shipped implementation is
//! [`crate::uds_client::UdsClient`].

use axon_protocol::rpc::RpcRequest;
use serde_json::Value;

use crate::error::RpcError;

pub trait RpcTransport: Send + Sync {
    /// Make one call and block for its reply. One connection per call is
    /// acceptable.
    fn call(&self, request: RpcRequest) -> Result<Value, RpcError>;
}
