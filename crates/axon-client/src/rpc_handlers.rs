//! Wires [`ClientWorker`]'s public contract onto a [`MethodTable`],
//! JSON-(de)serializing positional args the way the controller's
//! `UdsClient` calls encode them.

use std::sync::Arc;

use axon_protocol::rules::{Allowance, ClientRule};
use axon_rpc::MethodTable;
use serde_json::Value;

use crate::worker::ClientWorker;

fn arg<T: serde::de::DeserializeOwned>(args: &[Value], index: usize) -> Result<T, String> {
    let value = args
        .get(index)
        .ok_or_else(|| format!("missing positional argument {index}"))?;
    serde_json::from_value(value.clone()).map_err(|e| format!("bad argument {index}: {e}"))
}

pub fn register(table: &mut MethodTable, worker: Arc<ClientWorker>) {
    let w = Arc::clone(&worker);
    table.register("add_clients", move |req| {
        let rules: Vec<ClientRule> = arg(&req.args, 0)?;
        w.add_clients(rules);
        Ok(Value::Null)
    });

    let w = Arc::clone(&worker);
    table.register("delete_clients", move |req| {
        let rules: Vec<ClientRule> = arg(&req.args, 0)?;
        w.delete_clients(&rules).map_err(|e| e.to_string())?;
        Ok(Value::Null)
    });

    let w = Arc::clone(&worker);
    table.register("delete_all_clients", move |_req| {
        w.delete_all_clients();
        Ok(Value::Null)
    });

    let w = Arc::clone(&worker);
    table.register("disable_clients", move |req| {
        let rules: Vec<ClientRule> = arg(&req.args, 0)?;
        w.disable_clients(&rules).map_err(|e| e.to_string())?;
        Ok(Value::Null)
    });

    let w = Arc::clone(&worker);
    table.register("enable_clients", move |req| {
        let rules: Vec<ClientRule> = arg(&req.args, 0)?;
        w.enable_clients(&rules).map_err(|e| e.to_string())?;
        Ok(Value::Null)
    });

    let w = Arc::clone(&worker);
    table.register("set_clients_allowed", move |req| {
        let rules: Vec<ClientRule> = arg(&req.args, 0)?;
        let allowed: Allowance = arg(&req.args, 1)?;
        w.set_clients_allowed(&rules, allowed).map_err(|e| e.to_string())?;
        Ok(Value::Null)
    });

    let w = Arc::clone(&worker);
    table.register("update_request_count", move |req| {
        let rules: Vec<ClientRule> = arg(&req.args, 0)?;
        let request_count: u32 = arg(&req.args, 1)?;
        w.update_request_count(&rules, request_count).map_err(|e| e.to_string())?;
        Ok(Value::Null)
    });

    let w = Arc::clone(&worker);
    table.register("get_rule_count", move |_req| {
        Ok(Value::from(w.get_rule_count()))
    });

    let w = Arc::clone(&worker);
    table.register("has_rule", move |req| {
        let rule: ClientRule = arg(&req.args, 0)?;
        Ok(Value::from(w.has_rule(&rule)))
    });
}
