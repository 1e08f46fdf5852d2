//! The `axon-controller` process binary.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axon_controller::args::Args;
use axon_controller::{rpc_handlers, Controller};
use axon_rpc::{MethodTable, UdsServer};
use axon_store::InMemoryRuleStore;
use clap::Parser;
use tracing::{error, info};

fn main() {
    let args = Args::parse();
    axon_common::logging::init(args.verbosity());
    info!(?args, "starting axon-controller");

    let binary_dir = args.resolved_binary_dir().unwrap_or_else(|e| {
        error!("failed to resolve worker binary directory: {e}");
        std::process::exit(1);
    });
    let socket_dir = PathBuf::from(&args.socket_dir);
    let rpc_socket = PathBuf::from(&args.rpc_socket);

    let controller = Arc::new(
        Controller::new(
            Arc::new(InMemoryRuleStore::new()),
            binary_dir,
            socket_dir,
            rpc_socket.clone(),
        )
        .unwrap_or_else(|e| {
            error!("failed to initialize controller: {e}");
            std::process::exit(1);
        }),
    );

    let mut methods = MethodTable::new();
    rpc_handlers::register(&mut methods, Arc::clone(&controller));

    let server = UdsServer::bind(&rpc_socket, methods).unwrap_or_else(|e| {
        error!("failed to bind rpc socket {}: {e}", rpc_socket.display());
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

    if let Err(e) = controller.shutdown() {
        error!(error = %e, "error stopping workers during shutdown");
    }
}
