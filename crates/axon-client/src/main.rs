//! The `axon-client` worker process binary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axon_client::args::Args;
use axon_client::worker::{ClientWorker, Heartbeat};
use axon_client::rpc_handlers;
use axon_common::{ClockSource, WorkerUid};
use axon_metrics::MetricsCache;
use axon_protocol::rpc::RpcRequest;
use axon_rpc::{MethodTable, RpcTransport, UdsClient, UdsServer};
use clap::Parser;
use crossbeam_channel::unbounded;
use tracing::{error, info, warn};

fn main() {
    let args = Args::parse();
    axon_common::logging::init(args.verbosity());
    info!(?args, "starting axon-client worker");

    let uid = WorkerUid::new();
    let (heartbeat_tx, heartbeat_rx) = unbounded::<Heartbeat>();

    let worker = Arc::new(ClientWorker::with_pool_size(
        uid,
        Arc::new(MetricsCache::new()),
        heartbeat_tx,
        ClockSource::System,
        args.pool_size,
    ));

    if let Some(controller_socket) = args.controller_socket.clone() {
        std::thread::Builder::new()
            .name("axon-client-heartbeat-forwarder".to_string())
            .spawn(move || forward_heartbeats(controller_socket, heartbeat_rx))
            .expect("failed to spawn heartbeat forwarder thread");
    } else {
        warn!("no --controller-socket given, heartbeats will not be delivered");
        std::thread::spawn(move || for _ in heartbeat_rx.iter() {});
    }

    let mut methods = MethodTable::new();
    rpc_handlers::register(&mut methods, Arc::clone(&worker));

    let server = UdsServer::bind(&args.rpc_socket, methods).unwrap_or_else(|e| {
        error!("failed to bind rpc socket {}: {e}", args.rpc_socket);
        std::process::exit(1);
    });

    let keep_running = Arc::new(AtomicBool::new(true));
    let ctrlc_keep_running = Arc::clone(&keep_running);
    ctrlc::set_handler(move || {
        info!("received shutdown signal");
        ctrlc_keep_running.store(false, Ordering::SeqCst);
    })
    .expect("failed to install signal handler");

    server.serve(keep_running);
    worker.shutdown();
}

fn forward_heartbeats(controller_socket: String, heartbeat_rx: crossbeam_channel::Receiver<Heartbeat>) {
    let client = UdsClient::new(&controller_socket);
    for beat in heartbeat_rx.iter() {
        let request = RpcRequest::new("heartbeat").with_args(vec![
            serde_json::json!({
                "worker_uid": beat.worker_uid.to_string(),
                "status": beat.status,
                "rule_count": beat.rule_count,
                "timestamp": beat.timestamp,
            }),
        ]);

        if let Err(e) = client.call(request) {
            warn!(error = %e, "failed to deliver heartbeat to controller");
        }
    }
}
