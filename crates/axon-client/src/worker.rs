//! `ClientWorker`: owns a [`RuleCollection`] of `ClientRule`s, dispatches
//! probes through a [`ProbePool`], and emits a heartbeat.
//!
//! One thread per responsibility: the dispatch thread (and the pool
//! backing it) starts only when there is work and exits — together with
//! the pool — the moment the rule collection empties.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use axon_common::{ClockSource, WorkerUid};
use axon_protocol::collection::{RoundRobin, RuleNotFound};
use axon_protocol::rules::{Allowance, ClientRule, Protocol, RuleIdentity};
use axon_protocol::{MetricKey, RuleCollection};
use axon_metrics::MetricsCache;
use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

use crate::outcome::classify;
use crate::pool::{ProbePool, DEFAULT_POOL_SIZE};
use crate::probe::{probe_http, probe_tcp, probe_udp, PROBE_TIMEOUT};

/// `(worker_uid, status, rule_count, timestamp)` emitted to the
/// controller's heartbeat queue every [`HEARTBEAT_INTERVAL`].
#[derive(Debug, Clone)]
pub struct Heartbeat {
    pub worker_uid: WorkerUid,
    pub status: String,
    pub rule_count: usize,
    pub timestamp: u64,
}

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

pub struct ClientWorker {
    uid: WorkerUid,
    rules: RuleCollection<ClientRule>,
    metrics: Arc<MetricsCache>,
    pool_size: usize,
    udp_socket: Arc<Mutex<UdpSocket>>,
    http_agent: ureq::Agent,
    dispatch: Mutex<Option<JoinHandle<()>>>,
    dispatch_running: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl ClientWorker {
    pub fn new(
        uid: WorkerUid,
        metrics: Arc<MetricsCache>,
        heartbeat_tx: Sender<Heartbeat>,
        clock: ClockSource,
    ) -> Self {
        Self::with_pool_size(uid, metrics, heartbeat_tx, clock, DEFAULT_POOL_SIZE)
    }

    pub fn with_pool_size(
        uid: WorkerUid,
        metrics: Arc<MetricsCache>,
        heartbeat_tx: Sender<Heartbeat>,
        clock: ClockSource,
        pool_size: usize,
    ) -> Self {
        let udp_socket =
            UdpSocket::bind("0.0.0.0:0").expect("failed to bind client worker UDP socket");
        udp_socket
            .set_read_timeout(Some(PROBE_TIMEOUT))
            .expect("failed to set UDP probe read timeout");
        udp_socket
            .set_write_timeout(Some(PROBE_TIMEOUT))
            .expect("failed to set UDP probe write timeout");

        let worker = Self {
            uid,
            rules: RuleCollection::new(),
            metrics,
            pool_size,
            udp_socket: Arc::new(Mutex::new(udp_socket)),
            http_agent: ureq::Agent::new_with_defaults(),
            dispatch: Mutex::new(None),
            dispatch_running: Arc::new(AtomicBool::new(false)),
            alive: Arc::new(AtomicBool::new(true)),
            heartbeat: Mutex::new(None),
        };

        let handle = worker.spawn_heartbeat_loop(heartbeat_tx, clock);
        *worker.heartbeat.lock().expect("heartbeat handle mutex poisoned") = Some(handle);
        worker
    }

    pub fn uid(&self) -> WorkerUid {
        self.uid
    }

    /// Adds `rules`; starts the dispatch task if it was not already
    /// running.
    pub fn add_clients(&self, rules: Vec<ClientRule>) {
        self.rules.add_all(rules);
        self.ensure_dispatch_running();
    }

    /// Removes `rules` under a single lock acquisition, so a concurrent
    /// `add_clients`/`delete_clients` of the same set never leaves
    /// `get_rule_count()` at a partial value.
    pub fn delete_clients(&self, rules: &[ClientRule]) -> Result<(), RuleNotFound> {
        self.rules.delete_all(rules)
    }

    pub fn delete_all_clients(&self) {
        self.rules.clear();
    }

    /// Flips each rule's enabled flag in place; disabled rules stay in the
    /// collection (so the registry doesn't lose them) but `run_dispatch`
    /// skips them (invariant 2).
    pub fn disable_clients(&self, rules: &[ClientRule]) -> Result<(), RuleNotFound> {
        for rule in rules {
            self.rules.set_enabled(rule, false)?;
        }
        Ok(())
    }

    pub fn enable_clients(&self, rules: &[ClientRule]) -> Result<(), RuleNotFound> {
        for rule in rules {
            self.rules.set_enabled(rule, true)?;
        }
        self.ensure_dispatch_running();
        Ok(())
    }

    /// Flips each of `rules` (given at their old `Allowance`) to `allowed`
    /// in place, so the next probe after this call classifies outcomes
    /// against the new expectation.
    pub fn set_clients_allowed(&self, rules: &[ClientRule], allowed: Allowance) -> Result<(), RuleNotFound> {
        for rule in rules {
            self.rules.set_allowed(rule, allowed)?;
        }
        Ok(())
    }

    /// Sets each of `rules`' `request_count` for its next probe cycle.
    pub fn update_request_count(&self, rules: &[ClientRule], request_count: u32) -> Result<(), RuleNotFound> {
        for rule in rules {
            self.rules.set_request_count(rule, request_count)?;
        }
        Ok(())
    }

    pub fn get_rule_count(&self) -> usize {
        self.rules.count()
    }

    pub fn has_rule(&self, rule: &ClientRule) -> bool {
        self.rules.contains(rule)
    }

    fn ensure_dispatch_running(&self) {
        if self
            .dispatch_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let mut guard = self.dispatch.lock().expect("dispatch handle mutex poisoned");
        if let Some(previous) = guard.take() {
            let _ = previous.join();
        }

        let rules = self.rules.round_robin();
        let metrics = Arc::clone(&self.metrics);
        let udp_socket = Arc::clone(&self.udp_socket);
        let http_agent = self.http_agent.clone();
        let pool_size = self.pool_size;
        let dispatch_running = Arc::clone(&self.dispatch_running);
        let uid = self.uid;

        let handle = std::thread::Builder::new()
            .name(format!("axon-client-dispatch-{uid}"))
            .spawn(move || {
                run_dispatch(rules, metrics, udp_socket, http_agent, pool_size);
                dispatch_running.store(false, Ordering::SeqCst);
            })
            .expect("failed to spawn dispatch thread");

        *guard = Some(handle);
    }

    fn spawn_heartbeat_loop(&self, tx: Sender<Heartbeat>, clock: ClockSource) -> JoinHandle<()> {
        let alive = Arc::clone(&self.alive);
        let rules = self.rules.clone();
        let uid = self.uid;

        std::thread::Builder::new()
            .name(format!("axon-client-heartbeat-{uid}"))
            .spawn(move || {
                while alive.load(Ordering::Relaxed) {
                    let beat = Heartbeat {
                        worker_uid: uid,
                        status: "OK".to_string(),
                        rule_count: rules.count(),
                        timestamp: clock.epoch_seconds(),
                    };
                    if tx.send(beat).is_err() {
                        warn!("heartbeat queue closed, stopping heartbeat loop");
                        break;
                    }
                    std::thread::sleep(HEARTBEAT_INTERVAL);
                }
            })
            .expect("failed to spawn heartbeat thread")
    }

    /// Stops the heartbeat loop and waits for any in-flight dispatch task to
    /// drain. Does not clear assigned rules.
    pub fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(handle) = self.heartbeat.lock().expect("heartbeat handle mutex poisoned").take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.dispatch.lock().expect("dispatch handle mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}

fn run_dispatch(
    rules: RoundRobin<ClientRule>,
    metrics: Arc<MetricsCache>,
    udp_socket: Arc<Mutex<UdpSocket>>,
    http_agent: ureq::Agent,
    pool_size: usize,
) {
    info!("dispatch task starting");
    let pool = ProbePool::new(pool_size);

    for rule in rules {
        let metrics = Arc::clone(&metrics);
        let udp_socket = Arc::clone(&udp_socket);
        let http_agent = http_agent.clone();

        pool.submit(move || {
            if !rule.is_enabled() {
                return;
            }

            for _ in 0..rule.request_count.max(1) {
                let raw_success = match rule.protocol {
                    Protocol::Tcp => probe_tcp(&rule.destination, rule.port),
                    Protocol::Udp => probe_udp(&udp_socket, &rule.destination, rule.port),
                    Protocol::Http => probe_http(&http_agent, &rule.destination, rule.port, false),
                    Protocol::Https => probe_http(&http_agent, &rule.destination, rule.port, true),
                };

                let (connected, outcome) = classify(rule.allowed, raw_success);
                let key = MetricKey::new(
                    rule.source.clone(),
                    rule.destination.clone(),
                    rule.port,
                    rule.protocol,
                    connected,
                    outcome,
                );
                debug!(key = %key, "probe classified");
                metrics.inc(&key);
            }
        });
    }

    pool.shutdown_wait();
    info!("dispatch task exiting, rule collection is empty");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_protocol::rules::Allowance;
    use crossbeam_channel::unbounded;
    use std::net::TcpListener;

    fn worker() -> ClientWorker {
        let (tx, _rx) = unbounded();
        ClientWorker::with_pool_size(
            WorkerUid::new(),
            Arc::new(MetricsCache::new()),
            tx,
            ClockSource::System,
            2,
        )
    }

    #[test]
    fn add_clients_starts_dispatch_and_drains_to_empty() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                if let Ok(mut stream) = stream {
                    use std::io::{Read, Write};
                    let mut buf = [0u8; 7];
                    let _ = stream.read(&mut buf);
                    let _ = stream.write_all(&buf);
                }
            }
        });

        let worker = worker();
        let rule = ClientRule::new(
            "127.0.0.1",
            addr.ip().to_string(),
            addr.port(),
            Protocol::Tcp,
            Allowance::Allow,
            1,
        );
        worker.add_clients(vec![rule.clone()]);
        worker.delete_clients(&[rule]).unwrap();

        // Dispatch thread should observe the empty collection and exit on
        // its own; give it a moment, then assert the worker can shut down
        // cleanly (join would hang forever if it never noticed).
        std::thread::sleep(Duration::from_millis(200));
        worker.shutdown();
        assert_eq!(worker.get_rule_count(), 0);
    }

    #[test]
    fn delete_missing_rule_reports_not_found() {
        let worker = worker();
        let rule = ClientRule::new("a", "b", 80, Protocol::Http, Allowance::Allow, 1);
        assert!(worker.delete_clients(&[rule]).is_err());
        worker.shutdown();
    }

    #[test]
    fn disable_clients_leaves_the_rule_registered_but_unprobed() {
        let worker = worker();
        let rule = ClientRule::new("127.0.0.1", "127.0.0.1", 1, Protocol::Tcp, Allowance::Allow, 1);
        worker.add_clients(vec![rule.clone()]);

        worker.disable_clients(&[rule.clone()]).unwrap();
        assert_eq!(worker.get_rule_count(), 1, "disabling must not remove the rule");
        assert!(worker.has_rule(&rule));

        worker.enable_clients(&[rule]).unwrap();
        worker.shutdown();
    }

    #[test]
    fn set_clients_allowed_flips_the_registered_rule() {
        let worker = worker();
        let rule = ClientRule::new("127.0.0.1", "127.0.0.1", 1, Protocol::Tcp, Allowance::Allow, 1);
        worker.add_clients(vec![rule.clone()]);

        worker.set_clients_allowed(&[rule.clone()], Allowance::Deny).unwrap();

        let flipped = ClientRule::new("127.0.0.1", "127.0.0.1", 1, Protocol::Tcp, Allowance::Deny, 1);
        assert!(worker.has_rule(&flipped));
        assert!(!worker.has_rule(&rule));
        worker.shutdown();
    }

    #[test]
    fn update_request_count_on_unregistered_rule_reports_not_found() {
        let worker = worker();
        let rule = ClientRule::new("a", "b", 80, Protocol::Http, Allowance::Allow, 1);
        assert!(worker.update_request_count(&[rule], 5).is_err());
        worker.shutdown();
    }
}
