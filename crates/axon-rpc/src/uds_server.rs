//! A Unix-domain-socket RPC server: one thread per accepted connection,
//! dispatching each request frame through a [`MethodTable`].

use std::io::ErrorKind;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axon_protocol::rpc::{read_frame, write_frame, RpcRequest, RpcResult};
use tracing::{debug, warn};

use crate::error::RpcError;
use crate::method_table::MethodTable;

/// How long `serve`'s accept loop sleeps between non-blocking accept
/// attempts while polling `keep_running`.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct UdsServer {
    listener: UnixListener,
    socket_path: PathBuf,
    methods: Arc<MethodTable>,
}

impl UdsServer {
    /// Bind at `socket_path`, removing a stale socket file left behind by a
    /// prior run at the same path.
    pub fn bind(socket_path: impl AsRef<Path>, methods: MethodTable) -> Result<Self, RpcError> {
        let socket_path = socket_path.as_ref().to_path_buf();
        let _ = std::fs::remove_file(&socket_path);

        let listener = UnixListener::bind(&socket_path)?;
        listener.set_nonblocking(true)?;

        Ok(Self {
            listener,
            socket_path,
            methods: Arc::new(methods),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept and serve connections until `keep_running` is cleared. Each
    /// connection gets its own thread; a client opens one connection per
    /// call, so each thread typically handles a single request/response
    /// round trip before the peer disconnects.
    pub fn serve(&self, keep_running: Arc<AtomicBool>) {
        while keep_running.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    let methods = Arc::clone(&self.methods);
                    std::thread::spawn(move || handle_connection(stream, &methods));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    warn!(error = %e, "rpc accept failed");
                }
            }
        }

        debug!(path = ?self.socket_path, "rpc server shutting down");
    }
}

impl Drop for UdsServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

fn handle_connection(mut stream: UnixStream, methods: &MethodTable) {
    loop {
        let request: RpcRequest = match read_frame(&mut stream) {
            Ok(request) => request,
            Err(_) => return, // peer disconnected, or per-call connection already served
        };

        let result: RpcResult = methods.dispatch(request);
        if write_frame(&mut stream, &result).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uds_client::UdsClient;
    use serde_json::Value;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn server_dispatches_a_round_trip_call() {
        let dir = std::env::temp_dir().join(format!("axon-rpc-test-{}", std::process::id()));
        let _ = std::fs::remove_file(&dir);

        let mut methods = MethodTable::new();
        methods.register("ping", |_req| Ok(Value::String("pong".to_string())));

        let server = UdsServer::bind(&dir, methods).unwrap();
        let keep_running = Arc::new(AtomicBool::new(true));
        let server_keep_running = Arc::clone(&keep_running);
        let socket_path = server.socket_path().to_path_buf();

        let server_thread = std::thread::spawn(move || server.serve(server_keep_running));

        let client = UdsClient::new(&socket_path);
        let response = client.call(RpcRequest::new("ping")).unwrap();
        assert_eq!(response, Value::String("pong".to_string()));

        keep_running.store(false, Ordering::Relaxed);
        server_thread.join().unwrap();
        let _ = std::fs::remove_file(&socket_path);
    }
}
