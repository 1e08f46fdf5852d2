//! `workers_registry`/`rules_registry` bookkeeping.

use std::fmt;
use std::path::PathBuf;
use std::process::Child;

use axon_common::WorkerUid;
use axon_rpc::UdsClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    Server,
    Client,
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkerKind::Server => "server",
            WorkerKind::Client => "client",
        })
    }
}

impl WorkerKind {
    /// `rule_key`/`worker_key` prefix for this kind (`ServerRule::rule_key`
    /// and `ClientRule::rule_key` share the same `"{type}_"` convention).
    pub fn prefix(&self) -> &'static str {
        match self {
            WorkerKind::Server => "server_",
            WorkerKind::Client => "client_",
        }
    }
}

/// `workers_registry` entry: `worker_key -> context{uid, address,
/// process_handle}`.
pub struct WorkerContext {
    pub uid: WorkerUid,
    pub kind: WorkerKind,
    pub socket_path: PathBuf,
    pub process: Child,
    pub rpc: UdsClient,
}

impl WorkerContext {
    pub fn worker_key(&self) -> String {
        format!("{}_{}", self.kind, self.uid)
    }
}

impl Drop for WorkerContext {
    /// Best-effort: the controller is expected to stop workers cleanly via
    /// RPC before dropping their context, but a leaked process on an
    /// unexpected teardown shouldn't outlive the controller.
    fn drop(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_key_matches_the_type_uid_convention() {
        let uid = WorkerUid::new();
        let context = WorkerContext {
            uid,
            kind: WorkerKind::Client,
            socket_path: PathBuf::new(),
            process: std::process::Command::new("sleep").arg("1").spawn().unwrap(),
            rpc: UdsClient::new("/tmp/does-not-matter"),
        };
        assert_eq!(context.worker_key(), format!("client_{uid}"));
    }

    #[test]
    fn rule_key_and_worker_key_share_the_same_prefix() {
        assert!(format!("server_{}", WorkerUid::new()).starts_with(WorkerKind::Server.prefix()));
        assert!(format!("client_{}", WorkerUid::new()).starts_with(WorkerKind::Client.prefix()));
    }
}
