//! The `axon-server` worker process binary.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axon_server::args::Args;
use axon_server::rpc_handlers;
use axon_server::worker::ServerWorker;
use axon_rpc::{MethodTable, UdsServer};
use clap::Parser;
use tracing::{error, info, warn};

fn main() {
    let args = Args::parse();
    axon_common::logging::init(args.verbosity());
    info!(?args, "starting axon-server worker");

    let tls_config = if Path::new(&args.tls_cert).exists() && Path::new(&args.tls_key).exists() {
        match axon_server::tls::load_server_config(&args.tls_cert, &args.tls_key) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(error = %e, "failed to load TLS cert/key, HTTPS listeners will be unavailable");
                None
            }
        }
    } else {
        warn!("no TLS cert/key found at configured paths, HTTPS listeners will be unavailable");
        None
    };

    let worker = Arc::new(ServerWorker::spawn(tls_config));

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
