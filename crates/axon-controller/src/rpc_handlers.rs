//! Wires the controller's own RPC surface onto a [`MethodTable`]: heartbeat
//! ingestion from client workers (delivered here via `axon-client`'s
//! `--controller-socket` forwarder) plus the mutation entry points a
//! rule-store-facing caller would invoke.

use std::sync::Arc;

use axon_protocol::rules::{Allowance, ClientRule, ServerRule};
use axon_rpc::MethodTable;
use axon_store::{ClientRuleFilter, ServerRuleFilter};
use serde_json::Value;

use crate::controller::Controller;

fn arg<T: serde::de::DeserializeOwned>(args: &[Value], index: usize) -> Result<T, String> {
    let value = args
        .get(index)
        .ok_or_else(|| format!("missing positional argument {index}"))?;
    serde_json::from_value(value.clone()).map_err(|e| format!("bad argument {index}: {e}"))
}

pub fn register(table: &mut MethodTable, controller: Arc<Controller>) {
    let c = Arc::clone(&controller);
    table.register("heartbeat", move |req| {
        let beat: Value = arg(&req.args, 0)?;
        let worker_uid = beat
            .get("worker_uid")
            .and_then(Value::as_str)
            .ok_or("heartbeat missing worker_uid")?
            .to_string();
        let status = beat
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("OK")
            .to_string();
        let rule_count = beat.get("rule_count").and_then(Value::as_u64).unwrap_or(0) as usize;
        let timestamp = beat.get("timestamp").and_then(Value::as_u64).unwrap_or(0);
        c.record_heartbeat(worker_uid, status, rule_count, timestamp);
        Ok(Value::Null)
    });

    let c = Arc::clone(&controller);
    table.register("start_servers", move |req| {
        let rules: Vec<ServerRule> = arg(&req.args, 0)?;
        c.start_servers(rules).map_err(|e| e.to_string())?;
        Ok(Value::Null)
    });

    let c = Arc::clone(&controller);
    table.register("start_clients", move |req| {
        let rules: Vec<ClientRule> = arg(&req.args, 0)?;
        c.start_clients(rules).map_err(|e| e.to_string())?;
        Ok(Value::Null)
    });

    let c = Arc::clone(&controller);
    table.register("stop_servers", move |req| {
        let rules: Vec<ServerRule> = arg(&req.args, 0)?;
        c.stop_servers(&rules).map_err(|e| e.to_string())?;
        Ok(Value::Null)
    });

    let c = Arc::clone(&controller);
    table.register("stop_clients", move |req| {
        let rules: Vec<ClientRule> = arg(&req.args, 0)?;
        c.stop_clients(&rules).map_err(|e| e.to_string())?;
        Ok(Value::Null)
    });

    let c = Arc::clone(&controller);
    table.register("stop_all_servers", move |_req| {
        c.stop_all_servers().map_err(|e| e.to_string())?;
        Ok(Value::Null)
    });

    let c = Arc::clone(&controller);
    table.register("stop_all_clients", move |_req| {
        c.stop_all_clients().map_err(|e| e.to_string())?;
        Ok(Value::Null)
    });

    let c = Arc::clone(&controller);
    table.register("disable_clients_rule", move |req| {
        let filter: ClientRuleFilter = arg(&req.args, 0)?;
        let touched = c.disable_clients_rule(&filter).map_err(|e| e.to_string())?;
        Ok(Value::from(touched))
    });

    let c = Arc::clone(&controller);
    table.register("enable_clients_rule", move |req| {
        let filter: ClientRuleFilter = arg(&req.args, 0)?;
        let touched = c.enable_clients_rule(&filter).map_err(|e| e.to_string())?;
        Ok(Value::from(touched))
    });

    let c = Arc::clone(&controller);
    table.register("disable_servers_rule", move |req| {
        let filter: ServerRuleFilter = arg(&req.args, 0)?;
        let touched = c.disable_servers_rule(&filter).map_err(|e| e.to_string())?;
        Ok(Value::from(touched))
    });

    let c = Arc::clone(&controller);
    table.register("enable_servers_rule", move |req| {
        let filter: ServerRuleFilter = arg(&req.args, 0)?;
        let touched = c.enable_servers_rule(&filter).map_err(|e| e.to_string())?;
        Ok(Value::from(touched))
    });

    let c = Arc::clone(&controller);
    table.register("set_clients_allowed_rule", move |req| {
        let filter: ClientRuleFilter = arg(&req.args, 0)?;
        let allowed: Allowance = arg(&req.args, 1)?;
        let touched = c.set_clients_allowed_rule(&filter, allowed).map_err(|e| e.to_string())?;
        Ok(Value::from(touched))
    });

    let c = Arc::clone(&controller);
    table.register("update_clients_request_count_rule", move |req| {
        let filter: ClientRuleFilter = arg(&req.args, 0)?;
        let request_count: u32 = arg(&req.args, 1)?;
        let touched = c
            .update_clients_request_count_rule(&filter, request_count)
            .map_err(|e| e.to_string())?;
        Ok(Value::from(touched))
    });

    let c = Arc::clone(&controller);
    table.register("register_traffic", move |req| {
        let servers: Vec<ServerRule> = arg(&req.args, 0)?;
        let clients: Vec<ClientRule> = arg(&req.args, 1)?;
        c.register_traffic(servers, clients).map_err(|e| e.to_string())?;
        Ok(Value::Null)
    });

    let c = Arc::clone(&controller);
    table.register("rule_count", move |_req| Ok(Value::from(c.rule_count())));
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_protocol::rpc::RpcRequest;
    use axon_store::InMemoryRuleStore;

    fn controller() -> Arc<Controller> {
        let dir = std::env::temp_dir();
        Arc::new(
            Controller::new(
                Arc::new(InMemoryRuleStore::new()),
                dir.clone(),
                dir.clone(),
                dir.join("axon-controller-test-heartbeat.sock"),
            )
            .unwrap(),
        )
    }

    #[test]
    fn heartbeat_is_recorded_and_does_not_error() {
        let controller = controller();
        let mut table = MethodTable::new();
        register(&mut table, Arc::clone(&controller));

        let req = RpcRequest::new("heartbeat").with_args(vec![serde_json::json!({
            "worker_uid": "01ARZ3NDEKTSV4RRFFQ69G5FAV",
            "status": "OK",
            "rule_count": 3,
            "timestamp": 1_700_000_000u64,
        })]);
        let result = table.dispatch(req).into_result();
        assert!(result.is_ok());
    }

    #[test]
    fn set_clients_allowed_rule_reports_rows_touched() {
        let controller = controller();
        let mut table = MethodTable::new();
        register(&mut table, Arc::clone(&controller));

        let req = RpcRequest::new("set_clients_allowed_rule").with_args(vec![
            serde_json::to_value(axon_store::ClientRuleFilter::default()).unwrap(),
            serde_json::to_value(axon_protocol::rules::Allowance::Deny).unwrap(),
        ]);
        let result = table.dispatch(req).into_result().unwrap();
        assert_eq!(result, serde_json::Value::from(0u64));
    }

    #[test]
    fn register_traffic_is_idempotent() {
        let controller = controller();
        let mut table = MethodTable::new();
        register(&mut table, Arc::clone(&controller));

        let server = ServerRule::new("127.0.0.1", 8080, axon_protocol::rules::Protocol::Http);
        let req = RpcRequest::new("register_traffic").with_args(vec![
            serde_json::to_value(vec![server]).unwrap(),
            serde_json::to_value(Vec::<ClientRule>::new()).unwrap(),
        ]);
        table.dispatch(req.clone()).into_result().unwrap();
        table.dispatch(req).into_result().unwrap();
    }
}
