//! A per-call Unix-domain-socket RPC client.

use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use axon_protocol::rpc::{read_frame, write_frame, RpcRequest, RpcResult};
use serde_json::Value;

use crate::error::RpcError;
use crate::transport::RpcTransport;

pub struct UdsClient {
    socket_path: PathBuf,
}

impl UdsClient {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    pub fn call(&self, request: RpcRequest) -> Result<Value, RpcError> {
        let mut stream = UnixStream::connect(&self.socket_path)?;
        write_frame(&mut stream, &request)?;
        let result: RpcResult = read_frame(&mut stream)?;
        result.into_result().map_err(RpcError::Remote)
    }
}

impl RpcTransport for UdsClient {
    fn call(&self, request: RpcRequest) -> Result<Value, RpcError> {
        UdsClient::call(self, request)
    }
}
