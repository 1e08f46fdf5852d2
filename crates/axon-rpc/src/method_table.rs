//! `MethodTable`: a registered name → handler map, replacing dynamic
//! `getattr`-style dispatch on a `method_name` string with an explicit,
//! statically-registered table.

use std::collections::HashMap;
use std::sync::Arc;

use axon_protocol::rpc::{RpcRequest, RpcResult};
use serde_json::Value;

pub type Handler = Arc<dyn Fn(RpcRequest) -> Result<Value, String> + Send + Sync>;

#[derive(Default)]
pub struct MethodTable {
    handlers: HashMap<String, Handler>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, method: impl Into<String>, handler: F)
    where
        F: Fn(RpcRequest) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.handlers.insert(method.into(), Arc::new(handler));
    }

    /// Dispatch a request, converting an unknown method or a handler's
    /// returned `Err` into an `RpcResult::Err` rather than panicking — the
    /// caller always gets back a well-formed frame.
    pub fn dispatch(&self, request: RpcRequest) -> RpcResult {
        match self.handlers.get(&request.method) {
            Some(handler) => match handler(request) {
                Ok(value) => RpcResult::ok(value),
                Err(message) => RpcResult::err(message),
            },
            None => RpcResult::err(format!("unknown rpc method '{}'", request.method)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_to_the_registered_handler() {
        let mut table = MethodTable::new();
        table.register("echo", |req: RpcRequest| Ok(Value::String(req.method)));

        let result = table.dispatch(RpcRequest::new("echo"));
        assert!(matches!(result, RpcResult::Ok { value } if value == Value::String("echo".to_string())));
    }

    #[test]
    fn unknown_method_reports_an_error_result_not_a_panic() {
        let table = MethodTable::new();
        let result = table.dispatch(RpcRequest::new("nonexistent"));
        assert!(matches!(result, RpcResult::Err { .. }));
    }
}
