//! RPC wire envelope and length-delimited framing.
//!
//! A request is the triple `(method_name, positional_args, keyword_args)`;
//! a result is either a JSON value or an error message. Both are encoded
//! as JSON and written as a `u32` big-endian length prefix followed by
//! that many bytes — a fixed-then-variable framing discipline, with a
//! variable-length body since RPC calls aren't constrained to one fixed
//! wire format.

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;

/// Frames larger than this are refused rather than allocated for, so a
/// corrupt or hostile length prefix can't be used to exhaust memory.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RpcResult {
    Ok { value: Value },
    Err { message: String },
}

impl RpcResult {
    pub fn ok(value: Value) -> Self {
        RpcResult::Ok { value }
    }

    pub fn err(message: impl Into<String>) -> Self {
        RpcResult::Err {
            message: message.into(),
        }
    }

    pub fn into_result(self) -> Result<Value, String> {
        match self {
            RpcResult::Ok { value } => Ok(value),
            RpcResult::Err { message } => Err(message),
        }
    }
}

/// Write `value` as one length-delimited JSON frame.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<(), ProtocolError> {
    let body = serde_json::to_vec(value)?;
    let len = u32::try_from(body.len()).map_err(|_| ProtocolError::FrameTooLarge(u32::MAX))?;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-delimited JSON frame and decode it as `T`.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T, ProtocolError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body)?;
    Ok(serde_json::from_slice(&body)?)
}
