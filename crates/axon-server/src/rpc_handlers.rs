//! Wires `ServerWorker`'s public contract onto a `MethodTable`.

use std::sync::Arc;

use axon_protocol::rules::ServerRule;
use axon_rpc::MethodTable;
use serde_json::Value;

use crate::worker::ServerWorker;

fn arg<T: serde::de::DeserializeOwned>(args: &[Value], index: usize) -> Result<T, String> {
    let value = args
        .get(index)
        .ok_or_else(|| format!("missing positional argument {index}"))?;
    serde_json::from_value(value.clone()).map_err(|e| format!("bad argument {index}: {e}"))
}

pub fn register(table: &mut MethodTable, worker: Arc<ServerWorker>) {
    let w = Arc::clone(&worker);
    table.register("add_servers", move |req| {
        let rules: Vec<ServerRule> = arg(&req.args, 0)?;
        w.add_servers(rules).map_err(|e| e.to_string())?;
        Ok(Value::Null)
    });

    let w = Arc::clone(&worker);
    table.register("delete_servers", move |req| {
        let rules: Vec<ServerRule> = arg(&req.args, 0)?;
        w.delete_servers(rules).map_err(|e| e.to_string())?;
        Ok(Value::Null)
    });

    let w = Arc::clone(&worker);
    table.register("delete_all_servers", move |_req| {
        w.delete_all_servers();
        Ok(Value::Null)
    });

    let w = Arc::clone(&worker);
    table.register("disable_servers", move |req| {
        let rules: Vec<ServerRule> = arg(&req.args, 0)?;
        w.disable_servers(rules).map_err(|e| e.to_string())?;
        Ok(Value::Null)
    });

    let w = Arc::clone(&worker);
    table.register("enable_servers", move |req| {
        let rules: Vec<ServerRule> = arg(&req.args, 0)?;
        w.enable_servers(rules).map_err(|e| e.to_string())?;
        Ok(Value::Null)
    });

    let w = Arc::clone(&worker);
    table.register("get_server_count", move |_req| {
        Ok(Value::from(w.get_server_count()))
    });

    let w = Arc::clone(&worker);
    table.register("has_server", move |req| {
        let rule: ServerRule = arg(&req.args, 0)?;
        Ok(Value::from(w.has_server(&rule)))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_protocol::rpc::RpcRequest;
    use axon_protocol::rules::Protocol;

    #[test]
    fn add_and_count_round_trip_through_the_method_table() {
        let worker = Arc::new(ServerWorker::spawn(None));
        let mut table = MethodTable::new();
        register(&mut table, Arc::clone(&worker));

        let rule = ServerRule::new("127.0.0.1", 58_430, Protocol::Tcp);
        let add = RpcRequest::new("add_servers")
            .with_args(vec![serde_json::to_value(vec![rule]).unwrap()]);
        table.dispatch(add).into_result().unwrap();

        let count = table
            .dispatch(RpcRequest::new("get_server_count"))
            .into_result()
            .unwrap();
        assert_eq!(count, Value::from(1));

        worker.shutdown();
    }
}
