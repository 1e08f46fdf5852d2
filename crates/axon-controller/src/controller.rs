//! `Controller`: owns `workers_registry`/`rules_registry`, shards rules
//! across a fixed-size pool of worker processes per type, and routes
//! mutation RPCs to the worker that owns each rule.
//!
//! Grounded on `crates/server/src/main.rs`'s per-core spawn loop, generalized
//! from "spawn N threads in this process" to "spawn N worker *processes* and
//! track their `Child` handles" (§5: "multi-process at the controller
//! level").

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axon_protocol::rpc::RpcRequest;
use axon_protocol::rules::{Allowance, ClientRule, RuleIdentity, ServerRule};
use axon_rpc::{RpcTransport, UdsClient};
use axon_store::{ClientRuleFilter, RuleStore, ServerRuleFilter};
use tracing::{info, warn};

use crate::error::ControllerError;
use crate::registry::{WorkerContext, WorkerKind};

/// How long `spawn_worker` waits for the new process's RPC socket to appear
/// before giving up.
const WORKER_START_TIMEOUT: Duration = Duration::from_secs(5);
const WORKER_START_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Most recently observed heartbeat for one worker, keyed by `worker_key`.
#[derive(Debug, Clone)]
pub struct HeartbeatRecord {
    pub status: String,
    pub rule_count: usize,
    pub timestamp: u64,
}

/// How a `Controller` brings a new worker process into existence. Boxed so
/// tests can substitute a fake that doesn't require the real
/// `axon-client`/`axon-server` binaries to be built, while production code
/// always uses [`spawn_worker_process`].
type Spawner = dyn Fn(WorkerKind) -> Result<WorkerContext, ControllerError> + Send + Sync;

pub struct Controller {
    workers: Mutex<HashMap<String, WorkerContext>>,
    rules: Mutex<HashMap<String, String>>,
    heartbeats: Mutex<HashMap<String, HeartbeatRecord>>,
    rule_store: Arc<dyn RuleStore>,
    spawner: Box<Spawner>,
    runtime: tokio::runtime::Runtime,
}

impl Controller {
    pub fn new(
        rule_store: Arc<dyn RuleStore>,
        binary_dir: PathBuf,
        socket_dir: PathBuf,
        heartbeat_socket: PathBuf,
    ) -> Result<Self, ControllerError> {
        let spawner = move |kind| spawn_worker_process(kind, &binary_dir, &socket_dir, &heartbeat_socket);
        Self::with_spawner(rule_store, spawner)
    }

    /// Like [`Controller::new`], but with the worker-process-spawn step
    /// replaced by `spawner`. Production code has no reason to call this
    /// directly; it exists so tests can exercise the sharding algorithm
    /// without the real worker binaries on disk.
    pub fn with_spawner(
        rule_store: Arc<dyn RuleStore>,
        spawner: impl Fn(WorkerKind) -> Result<WorkerContext, ControllerError> + Send + Sync + 'static,
    ) -> Result<Self, ControllerError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .map_err(ControllerError::Io)?;

        Ok(Self {
            workers: Mutex::new(HashMap::new()),
            rules: Mutex::new(HashMap::new()),
            heartbeats: Mutex::new(HashMap::new()),
            rule_store,
            spawner: Box::new(spawner),
            runtime,
        })
    }

    pub fn record_heartbeat(&self, worker_key: String, status: String, rule_count: usize, timestamp: u64) {
        self.heartbeats.lock().expect("heartbeats mutex poisoned").insert(
            worker_key,
            HeartbeatRecord {
                status,
                rule_count,
                timestamp,
            },
        );
    }

    // -- registration ---------------------------------------------------

    /// Inserts `servers`/`clients` into the rule store, skipping any whose
    /// identity tuple already matches an existing row. Calling this twice
    /// with the same declaration only adds rows on the first call.
    pub fn register_traffic(
        &self,
        servers: Vec<ServerRule>,
        clients: Vec<ClientRule>,
    ) -> Result<(), ControllerError> {
        self.runtime.block_on(async {
            let existing_servers = self.rule_store.query_servers(&ServerRuleFilter::default()).await?;
            let new_servers: Vec<ServerRule> = servers
                .into_iter()
                .filter(|r| !existing_servers.contains(r))
                .collect();
            if !new_servers.is_empty() {
                self.rule_store.insert_servers(new_servers).await?;
            }

            let existing_clients = self.rule_store.query_clients(&ClientRuleFilter::default()).await?;
            let new_clients: Vec<ClientRule> = clients
                .into_iter()
                .filter(|r| !existing_clients.contains(r))
                .collect();
            if !new_clients.is_empty() {
                self.rule_store.insert_clients(new_clients).await?;
            }

            Ok::<(), ControllerError>(())
        })
    }

    // -- sharding ---------------------------------------------------------

    pub fn start_servers(&self, rules: Vec<ServerRule>) -> Result<(), ControllerError> {
        let new_rules = self.filter_unregistered(rules, |r| r.rule_key());
        if new_rules.is_empty() {
            return Ok(());
        }

        self.shard(WorkerKind::Server, new_rules, |worker, slice| {
            let args = serde_json::to_value(slice).expect("server rule slice is always serializable");
            worker.rpc.call(RpcRequest::new("add_servers").with_args(vec![args]))
        })
    }

    pub fn start_clients(&self, rules: Vec<ClientRule>) -> Result<(), ControllerError> {
        let new_rules = self.filter_unregistered(rules, |r| r.rule_key());
        if new_rules.is_empty() {
            return Ok(());
        }

        self.shard(WorkerKind::Client, new_rules, |worker, slice| {
            let args = serde_json::to_value(slice).expect("client rule slice is always serializable");
            worker.rpc.call(RpcRequest::new("add_clients").with_args(vec![args]))
        })
    }

    pub fn stop_servers(&self, rules: &[ServerRule]) -> Result<(), ControllerError> {
        self.stop(
            rules,
            |r| r.rule_key(),
            "delete_servers",
        )
    }

    pub fn stop_clients(&self, rules: &[ClientRule]) -> Result<(), ControllerError> {
        self.stop(
            rules,
            |r| r.rule_key(),
            "delete_clients",
        )
    }

    // -- enable/disable ---------------------------------------------------

    /// Disables every client rule matching `filter`: persists the flag via
    /// the rule store, then tells whichever worker owns each matched rule
    /// to stop executing it. Returns the number of rows the store touched.
    pub fn disable_clients_rule(&self, filter: &ClientRuleFilter) -> Result<usize, ControllerError> {
        self.set_clients_enabled(filter, false)
    }

    pub fn enable_clients_rule(&self, filter: &ClientRuleFilter) -> Result<usize, ControllerError> {
        self.set_clients_enabled(filter, true)
    }

    pub fn disable_servers_rule(&self, filter: &ServerRuleFilter) -> Result<usize, ControllerError> {
        self.set_servers_enabled(filter, false)
    }

    pub fn enable_servers_rule(&self, filter: &ServerRuleFilter) -> Result<usize, ControllerError> {
        self.set_servers_enabled(filter, true)
    }

    /// Persists `allowed` for every client rule matching `filter`, then
    /// tells whichever worker owns each matched rule to flip it. Returns
    /// the number of rows the store touched.
    pub fn set_clients_allowed_rule(
        &self,
        filter: &ClientRuleFilter,
        allowed: Allowance,
    ) -> Result<usize, ControllerError> {
        let (rows, touched) = self.runtime.block_on(async {
            let rows = self.rule_store.query_clients(filter).await?;
            let touched = self.rule_store.set_clients_allowed(filter, allowed).await?;
            Ok::<_, ControllerError>((rows, touched))
        })?;

        self.dispatch_client_update(rows, "set_clients_allowed", allowed)?;
        Ok(touched)
    }

    /// Persists `request_count` for every client rule matching `filter`,
    /// then tells whichever worker owns each matched rule. Returns the
    /// number of rows the store touched.
    pub fn update_clients_request_count_rule(
        &self,
        filter: &ClientRuleFilter,
        request_count: u32,
    ) -> Result<usize, ControllerError> {
        let (rows, touched) = self.runtime.block_on(async {
            let rows = self.rule_store.query_clients(filter).await?;
            let touched = self.rule_store.update_request_count(filter, request_count).await?;
            Ok::<_, ControllerError>((rows, touched))
        })?;

        self.dispatch_client_update(rows, "update_request_count", request_count)?;
        Ok(touched)
    }

    fn set_clients_enabled(&self, filter: &ClientRuleFilter, enabled: bool) -> Result<usize, ControllerError> {
        let (rows, touched) = self.runtime.block_on(async {
            let rows = self.rule_store.query_clients(filter).await?;
            let touched = self.rule_store.set_clients_enabled(filter, enabled).await?;
            Ok::<_, ControllerError>((rows, touched))
        })?;

        let method = if enabled { "enable_clients" } else { "disable_clients" };
        self.dispatch_enable_toggle(rows, method)?;
        Ok(touched)
    }

    fn set_servers_enabled(&self, filter: &ServerRuleFilter, enabled: bool) -> Result<usize, ControllerError> {
        let (rows, touched) = self.runtime.block_on(async {
            let rows = self.rule_store.query_servers(filter).await?;
            let touched = self.rule_store.set_servers_enabled(filter, enabled).await?;
            Ok::<_, ControllerError>((rows, touched))
        })?;

        let method = if enabled { "enable_servers" } else { "disable_servers" };
        self.dispatch_enable_toggle(rows, method)?;
        Ok(touched)
    }

    /// Groups `rows` by owning worker (via `rules_registry`) and sends one
    /// `method` RPC per worker carrying that worker's slice. Rows with no
    /// registry entry are skipped — they were declared but never dispatched
    /// to a worker, so there's nothing running to toggle.
    fn dispatch_enable_toggle<R: RuleIdentity + serde::Serialize>(
        &self,
        rows: Vec<R>,
        method: &str,
    ) -> Result<(), ControllerError> {
        let mut by_worker: HashMap<String, Vec<R>> = HashMap::new();
        {
            let registry = self.rules.lock().expect("rules mutex poisoned");
            for row in rows {
                if let Some(worker_key) = registry.get(&row.rule_key()) {
                    by_worker.entry(worker_key.clone()).or_default().push(row);
                }
            }
        }

        for (worker_key, slice) in &by_worker {
            let workers = self.workers.lock().expect("workers mutex poisoned");
            let context = workers
                .get(worker_key)
                .ok_or_else(|| ControllerError::WorkerNotFound(worker_key.clone()))?;
            let args = serde_json::to_value(slice).expect("rule slice is always serializable");
            context.rpc.call(RpcRequest::new(method).with_args(vec![args]))?;
        }
        Ok(())
    }

    /// Groups `rows` (given at their *old* identity, as read from the store
    /// before the update) by owning worker and sends one `method` RPC per
    /// worker carrying that worker's slice plus `extra`. Used for
    /// `set_clients_allowed`/`update_request_count`, which both need a
    /// second positional argument beyond the rule slice.
    fn dispatch_client_update<E: serde::Serialize>(
        &self,
        rows: Vec<ClientRule>,
        method: &str,
        extra: E,
    ) -> Result<(), ControllerError> {
        let mut by_worker: HashMap<String, Vec<ClientRule>> = HashMap::new();
        {
            let registry = self.rules.lock().expect("rules mutex poisoned");
            for row in rows {
                if let Some(worker_key) = registry.get(&row.rule_key()) {
                    by_worker.entry(worker_key.clone()).or_default().push(row);
                }
            }
        }

        let extra = serde_json::to_value(&extra).expect("extra argument is always serializable");
        for (worker_key, slice) in &by_worker {
            let workers = self.workers.lock().expect("workers mutex poisoned");
            let context = workers
                .get(worker_key)
                .ok_or_else(|| ControllerError::WorkerNotFound(worker_key.clone()))?;
            let rules_arg = serde_json::to_value(slice).expect("rule slice is always serializable");
            context
                .rpc
                .call(RpcRequest::new(method).with_args(vec![rules_arg, extra.clone()]))?;
        }
        Ok(())
    }

    pub fn stop_all_servers(&self) -> Result<(), ControllerError> {
        self.stop_all(WorkerKind::Server, "delete_all_servers")
    }

    pub fn stop_all_clients(&self) -> Result<(), ControllerError> {
        self.stop_all(WorkerKind::Client, "delete_all_clients")
    }

    /// Stops every client and server worker. The source this was distilled
    /// from stopped clients but then *started* servers again instead of
    /// stopping them; this is treated as a bug, and both kinds are stopped
    /// here (recorded as an Open Question decision in DESIGN.md).
    pub fn shutdown(&self) -> Result<(), ControllerError> {
        self.stop_all_clients()?;
        self.stop_all_servers()?;
        Ok(())
    }

    pub fn worker_count(&self, kind: WorkerKind) -> usize {
        self.workers
            .lock()
            .expect("workers mutex poisoned")
            .values()
            .filter(|w| w.kind == kind)
            .count()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.lock().expect("rules mutex poisoned").len()
    }

    // -- internals ------------------------------------------------------

    fn filter_unregistered<R>(&self, rules: Vec<R>, rule_key: impl Fn(&R) -> String) -> Vec<R> {
        let registry = self.rules.lock().expect("rules mutex poisoned");
        rules
            .into_iter()
            .filter(|r| !registry.contains_key(&rule_key(r)))
            .collect()
    }

    /// Shared body of `start_servers`/`start_clients`: steps 2-5 of the
    /// sharding algorithm. `send` issues the worker-specific "add rules" RPC
    /// call for one slice.
    fn shard<R: RuleIdentity + Clone>(
        &self,
        kind: WorkerKind,
        new_rules: Vec<R>,
        send: impl Fn(&WorkerContext, &[R]) -> Result<serde_json::Value, axon_rpc::RpcError>,
    ) -> Result<(), ControllerError> {
        let target = target_worker_count();
        let current = self.worker_count(kind);
        let rules_per_worker = new_rules.len().div_ceil(target).max(1);

        if current == target {
            let worker_keys = self.existing_worker_keys_sorted(kind);
            for (slice, worker_key) in new_rules.chunks(rules_per_worker).zip(worker_keys) {
                self.dispatch_slice(&worker_key, slice, &send)?;
            }
        } else {
            let to_spawn = target.saturating_sub(current);
            let mut chunks = new_rules.chunks(rules_per_worker);
            for _ in 0..to_spawn {
                let Some(slice) = chunks.next() else { break };
                let context = self.spawn_worker(kind)?;
                let worker_key = context.worker_key();
                self.workers
                    .lock()
                    .expect("workers mutex poisoned")
                    .insert(worker_key.clone(), context);
                self.dispatch_slice(&worker_key, slice, &send)?;
            }
        }

        Ok(())
    }

    fn dispatch_slice<R: RuleIdentity>(
        &self,
        worker_key: &str,
        slice: &[R],
        send: &impl Fn(&WorkerContext, &[R]) -> Result<serde_json::Value, axon_rpc::RpcError>,
    ) -> Result<(), ControllerError> {
        if slice.is_empty() {
            return Ok(());
        }

        {
            let workers = self.workers.lock().expect("workers mutex poisoned");
            let context = workers
                .get(worker_key)
                .ok_or_else(|| ControllerError::WorkerNotFound(worker_key.to_string()))?;
            send(context, slice)?;
        }

        let mut registry = self.rules.lock().expect("rules mutex poisoned");
        for rule in slice {
            registry.insert(rule.rule_key(), worker_key.to_string());
        }
        Ok(())
    }

    fn stop<R: RuleIdentity + serde::Serialize>(
        &self,
        rules: &[R],
        rule_key: impl Fn(&R) -> String,
        method: &str,
    ) -> Result<(), ControllerError> {
        let mut by_worker: HashMap<String, Vec<&R>> = HashMap::new();
        {
            let registry = self.rules.lock().expect("rules mutex poisoned");
            for rule in rules {
                let key = rule_key(rule);
                if let Some(worker_key) = registry.get(&key) {
                    by_worker.entry(worker_key.clone()).or_default().push(rule);
                } else {
                    return Err(ControllerError::RuleNotFound(key));
                }
            }
        }

        for (worker_key, slice) in &by_worker {
            let workers = self.workers.lock().expect("workers mutex poisoned");
            let context = workers
                .get(worker_key)
                .ok_or_else(|| ControllerError::WorkerNotFound(worker_key.clone()))?;
            let payload: Vec<&R> = slice.clone();
            let args = serde_json::to_value(&payload).expect("rule slice is always serializable");
            context.rpc.call(RpcRequest::new(method).with_args(vec![args]))?;
        }

        let mut registry = self.rules.lock().expect("rules mutex poisoned");
        for rule in rules {
            registry.remove(&rule_key(rule));
        }
        Ok(())
    }

    fn stop_all(&self, kind: WorkerKind, method: &str) -> Result<(), ControllerError> {
        let worker_keys: Vec<String> = self
            .workers
            .lock()
            .expect("workers mutex poisoned")
            .values()
            .filter(|w| w.kind == kind)
            .map(WorkerContext::worker_key)
            .collect();

        for worker_key in &worker_keys {
            let context = self.workers.lock().expect("workers mutex poisoned").remove(worker_key);
            if let Some(mut context) = context {
                let _ = context.rpc.call(RpcRequest::new(method));
                let _ = context.process.kill();
                let _ = context.process.wait();
            }
        }

        self.rules
            .lock()
            .expect("rules mutex poisoned")
            .retain(|key, _| !key.starts_with(kind.prefix()));
        Ok(())
    }

    fn existing_worker_keys_sorted(&self, kind: WorkerKind) -> Vec<String> {
        let mut keys: Vec<String> = self
            .workers
            .lock()
            .expect("workers mutex poisoned")
            .values()
            .filter(|w| w.kind == kind)
            .map(WorkerContext::worker_key)
            .collect();
        // Ulid's canonical string encoding sorts lexicographically by
        // creation time, so this is enumeration order without needing `Ord`
        // on `WorkerUid` itself.
        keys.sort();
        keys
    }

    fn spawn_worker(&self, kind: WorkerKind) -> Result<WorkerContext, ControllerError> {
        (self.spawner)(kind)
    }
}

/// Spawns the sibling `axon-client`/`axon-server` binary found under
/// `binary_dir`, passing `--rpc-socket` (and, for clients,
/// `--controller-socket`), then polls for the socket file to appear before
/// handing back a connected [`UdsClient`].
///
/// The source this was distilled from re-execs its own binary with a
/// `--role server|client` flag; `axon-client` and `axon-server` were built
/// here as two separate binaries with distinct CLI surfaces rather than one
/// role-dispatching binary, so the controller spawns each directly instead
/// (see DESIGN.md).
pub fn spawn_worker_process(
    kind: WorkerKind,
    binary_dir: &Path,
    socket_dir: &Path,
    heartbeat_socket: &Path,
) -> Result<WorkerContext, ControllerError> {
    let uid = axon_common::WorkerUid::new();
    let binary_name = match kind {
        WorkerKind::Server => "axon-server",
        WorkerKind::Client => "axon-client",
    };
    let binary_path = binary_dir.join(binary_name);
    let socket_path = socket_dir.join(format!("{kind}_{uid}.sock"));

    let mut command = Command::new(&binary_path);
    command.arg("--rpc-socket").arg(&socket_path);
    if kind == WorkerKind::Client {
        command.arg("--controller-socket").arg(heartbeat_socket);
    }

    info!(?kind, %uid, binary = %binary_path.display(), "spawning worker process");
    let process: Child = command.spawn()?;

    wait_for_socket(&socket_path, WORKER_START_TIMEOUT)?;

    let rpc = UdsClient::new(&socket_path);
    Ok(WorkerContext {
        uid,
        kind,
        socket_path,
        process,
        rpc,
    })
}

pub(crate) fn target_worker_count() -> usize {
    let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    cpus.min(2)
}

fn wait_for_socket(path: &Path, timeout: Duration) -> Result<(), ControllerError> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if path.exists() {
            return Ok(());
        }
        std::thread::sleep(WORKER_START_POLL_INTERVAL);
    }
    warn!(path = ?path, "worker rpc socket did not appear in time");
    Err(ControllerError::WorkerStartTimeout(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_protocol::rules::{Allowance, Protocol};
    use axon_rpc::{MethodTable, UdsServer};
    use axon_store::InMemoryRuleStore;
    use std::sync::atomic::AtomicBool;

    /// Binds a no-op RPC server (every mutation method just returns `Null`)
    /// at a fresh socket path and spawns a throwaway real process to stand
    /// in for the worker's process handle, without depending on the real
    /// `axon-client`/`axon-server` binaries being built.
    fn fake_spawner() -> impl Fn(WorkerKind) -> Result<WorkerContext, ControllerError> + Send + Sync + 'static {
        move |kind| {
            let uid = axon_common::WorkerUid::new();
            let socket_path =
                std::env::temp_dir().join(format!("axon-controller-test-{kind}-{uid}.sock"));

            let mut methods = MethodTable::new();
            for method in [
                "add_servers",
                "delete_servers",
                "delete_all_servers",
                "add_clients",
                "delete_clients",
                "delete_all_clients",
                "disable_servers",
                "enable_servers",
                "disable_clients",
                "enable_clients",
                "set_clients_allowed",
                "update_request_count",
            ] {
                methods.register(method, |_req| Ok(serde_json::Value::Null));
            }

            let server = UdsServer::bind(&socket_path, methods)?;
            let keep_running = Arc::new(AtomicBool::new(true));
            let server_keep_running = Arc::clone(&keep_running);
            std::thread::spawn(move || server.serve(server_keep_running));
            // Intentionally leaked: the fake server thread lives for the
            // rest of the test process, there's no handle to join here.
            std::mem::forget(keep_running);

            let process = Command::new("sleep").arg("60").spawn()?;
            let rpc = UdsClient::new(&socket_path);

            Ok(WorkerContext {
                uid,
                kind,
                socket_path,
                process,
                rpc,
            })
        }
    }

    fn controller() -> Controller {
        Controller::with_spawner(Arc::new(InMemoryRuleStore::new()), fake_spawner()).unwrap()
    }

    fn client_rule(port: u16) -> ClientRule {
        ClientRule::new("10.0.0.1", "10.0.0.2", port, Protocol::Tcp, Allowance::Allow, 1)
    }

    #[test]
    fn start_clients_shards_across_the_target_worker_count() {
        let controller = controller();
        let rules: Vec<ClientRule> = (1..=20u16).map(client_rule).collect();

        controller.start_clients(rules).unwrap();

        assert_eq!(controller.worker_count(WorkerKind::Client), target_worker_count());
        assert_eq!(controller.rule_count(), 20);
    }

    #[test]
    fn stop_clients_leaves_no_registry_entry_for_stopped_rules() {
        let controller = controller();
        let rules: Vec<ClientRule> = (1..=4u16).map(client_rule).collect();

        controller.start_clients(rules.clone()).unwrap();
        assert_eq!(controller.rule_count(), 4);

        controller.stop_clients(&rules).unwrap();
        assert_eq!(controller.rule_count(), 0);
    }

    #[test]
    fn start_clients_is_a_no_op_for_already_registered_rules() {
        let controller = controller();
        let rules: Vec<ClientRule> = (1..=3u16).map(client_rule).collect();

        controller.start_clients(rules.clone()).unwrap();
        let workers_before = controller.worker_count(WorkerKind::Client);

        controller.start_clients(rules).unwrap();
        assert_eq!(controller.rule_count(), 3, "re-registering must not duplicate entries");
        assert_eq!(controller.worker_count(WorkerKind::Client), workers_before);
    }

    #[test]
    fn start_clients_redistributes_across_existing_workers_once_the_pool_is_full() {
        let controller = controller();
        controller.start_clients((1..=4u16).map(client_rule).collect()).unwrap();
        let workers_after_first_call = controller.worker_count(WorkerKind::Client);
        assert_eq!(workers_after_first_call, target_worker_count());

        controller.start_clients((5..=8u16).map(client_rule).collect()).unwrap();

        assert_eq!(
            controller.worker_count(WorkerKind::Client),
            workers_after_first_call,
            "no new workers should spawn once the pool for this type is already at target size"
        );
        assert_eq!(controller.rule_count(), 8);
    }

    #[test]
    fn stop_unregistered_rule_is_an_error() {
        let controller = controller();
        assert!(controller.stop_clients(&[client_rule(1)]).is_err());
    }

    #[test]
    fn register_traffic_only_inserts_new_rows_on_the_first_call() {
        let store = Arc::new(InMemoryRuleStore::new());
        let controller: Controller = Controller::with_spawner(Arc::clone(&store), fake_spawner()).unwrap();

        let server = ServerRule::new("127.0.0.1", 9090, Protocol::Http);
        controller
            .register_traffic(vec![server.clone()], Vec::new())
            .unwrap();
        controller.register_traffic(vec![server], Vec::new()).unwrap();

        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let rows = rt.block_on(store.query_servers(&ServerRuleFilter::default())).unwrap();
        assert_eq!(rows.len(), 1, "identical declaration must only add a row once");
    }

    #[test]
    fn disable_clients_rule_persists_and_routes_to_the_owning_worker() {
        let store = Arc::new(InMemoryRuleStore::new());
        let controller: Controller = Controller::with_spawner(Arc::clone(&store), fake_spawner()).unwrap();
        let rule = client_rule(1);

        controller.start_clients(vec![rule.clone()]).unwrap();
        controller
            .register_traffic(Vec::new(), vec![rule.clone()])
            .unwrap();

        let filter = axon_store::ClientRuleFilter {
            destination: Some("10.0.0.2".to_string()),
            port: Some(1),
            ..Default::default()
        };
        let touched = controller.disable_clients_rule(&filter).unwrap();
        assert_eq!(touched, 1);

        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let rows = rt.block_on(store.query_clients(&ClientRuleFilter::default())).unwrap();
        assert!(!rows[0].enabled, "store row must reflect the disable");

        assert_eq!(controller.rule_count(), 1, "disabling must not unregister the rule");
    }

    #[test]
    fn set_clients_allowed_rule_persists_and_routes_to_the_owning_worker() {
        let store = Arc::new(InMemoryRuleStore::new());
        let controller: Controller = Controller::with_spawner(Arc::clone(&store), fake_spawner()).unwrap();
        let rule = client_rule(1);

        controller.start_clients(vec![rule.clone()]).unwrap();
        controller
            .register_traffic(Vec::new(), vec![rule.clone()])
            .unwrap();

        let filter = axon_store::ClientRuleFilter {
            destination: Some("10.0.0.2".to_string()),
            port: Some(1),
            ..Default::default()
        };
        let touched = controller.set_clients_allowed_rule(&filter, Allowance::Deny).unwrap();
        assert_eq!(touched, 1);

        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let rows = rt.block_on(store.query_clients(&ClientRuleFilter::default())).unwrap();
        assert_eq!(rows[0].allowed, Allowance::Deny, "store row must reflect the new allowance");

        assert_eq!(controller.rule_count(), 1, "changing allowance must not unregister the rule");
    }

    #[test]
    fn update_clients_request_count_rule_persists_and_routes_to_the_owning_worker() {
        let store = Arc::new(InMemoryRuleStore::new());
        let controller: Controller = Controller::with_spawner(Arc::clone(&store), fake_spawner()).unwrap();
        let rule = client_rule(1);

        controller.start_clients(vec![rule.clone()]).unwrap();
        controller
            .register_traffic(Vec::new(), vec![rule.clone()])
            .unwrap();

        let filter = axon_store::ClientRuleFilter {
            destination: Some("10.0.0.2".to_string()),
            port: Some(1),
            ..Default::default()
        };
        let touched = controller.update_clients_request_count_rule(&filter, 7).unwrap();
        assert_eq!(touched, 1);

        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let rows = rt.block_on(store.query_clients(&ClientRuleFilter::default())).unwrap();
        assert_eq!(rows[0].request_count, 7, "store row must reflect the new request_count");

        assert_eq!(controller.rule_count(), 1, "updating request_count must not unregister the rule");
    }

    #[test]
    fn set_clients_allowed_rule_for_an_unmatched_filter_touches_nothing() {
        let controller = controller();
        let filter = axon_store::ClientRuleFilter {
            destination: Some("nonexistent".to_string()),
            ..Default::default()
        };
        assert_eq!(controller.set_clients_allowed_rule(&filter, Allowance::Deny).unwrap(), 0);
    }

    #[test]
    fn shutdown_stops_both_clients_and_servers() {
        let controller = controller();
        controller.start_clients(vec![client_rule(1)]).unwrap();
        controller
            .start_servers(vec![ServerRule::new("127.0.0.1", 8080, Protocol::Http)])
            .unwrap();

        controller.shutdown().unwrap();

        assert_eq!(controller.worker_count(WorkerKind::Client), 0);
        assert_eq!(controller.worker_count(WorkerKind::Server), 0);
        assert_eq!(controller.rule_count(), 0);
    }
}
