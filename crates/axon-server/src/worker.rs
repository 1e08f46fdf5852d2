//! `ServerWorker`: a single-threaded mio event loop hosting one listener
//! per `ServerRule`. RPC-facing calls run on another thread
//! and talk to the loop over a command channel, since a mio `Poll` and its
//! registered sources aren't meant to be driven from more than one thread.

use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axon_protocol::rules::{Protocol, ServerRule};
use crossbeam_channel::{bounded, Receiver, Sender};
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::ServerError;
use crate::listener::ListenerSlot;

const POLL_TIMEOUT: Duration = Duration::from_millis(100);
const EVENTS_CAPACITY: usize = 1024;

enum Command {
    AddServers(Vec<ServerRule>, Sender<Result<(), ServerError>>),
    DeleteServers(Vec<ServerRule>, Sender<Result<(), ServerError>>),
    DeleteAll(Sender<()>),
    SetEnabled(Vec<ServerRule>, bool, Sender<Result<(), ServerError>>),
    GetCount(Sender<usize>),
    HasServer(ServerRule, Sender<bool>),
    Shutdown,
}

/// Handle used by the RPC method handlers; the actual event loop runs on
/// its own dedicated thread.
pub struct ServerWorker {
    cmd_tx: Sender<Command>,
    thread: std::sync::Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl ServerWorker {
    pub fn spawn(tls_config: Option<Arc<rustls::ServerConfig>>) -> Self {
        let (cmd_tx, cmd_rx) = bounded(64);

        let thread = std::thread::Builder::new()
            .name("axon-server-event-loop".to_string())
            .spawn(move || {
                let mut event_loop = EventLoop::new(cmd_rx, tls_config)
                    .expect("failed to create mio event loop");
                event_loop.run();
            })
            .expect("failed to spawn event loop thread");

        Self {
            cmd_tx,
            thread: std::sync::Mutex::new(Some(thread)),
        }
    }

    pub fn add_servers(&self, rules: Vec<ServerRule>) -> Result<(), ServerError> {
        let (tx, rx) = bounded(1);
        self.cmd_tx
            .send(Command::AddServers(rules, tx))
            .map_err(|_| ServerError::Io(std::io::Error::other("event loop closed")))?;
        rx.recv().map_err(|_| ServerError::Io(std::io::Error::other("event loop closed")))?
    }

    pub fn delete_servers(&self, rules: Vec<ServerRule>) -> Result<(), ServerError> {
        let (tx, rx) = bounded(1);
        self.cmd_tx
            .send(Command::DeleteServers(rules, tx))
            .map_err(|_| ServerError::Io(std::io::Error::other("event loop closed")))?;
        rx.recv().map_err(|_| ServerError::Io(std::io::Error::other("event loop closed")))?
    }

    /// Flips the enabled flag for `rules` in place without tearing down
    /// their listeners; disabled listeners keep accepting (to avoid an
    /// unbounded backlog) but drop each connection immediately (invariant
    /// 2: a disabled rule is never executed).
    fn set_enabled(&self, rules: Vec<ServerRule>, enabled: bool) -> Result<(), ServerError> {
        let (tx, rx) = bounded(1);
        self.cmd_tx
            .send(Command::SetEnabled(rules, enabled, tx))
            .map_err(|_| ServerError::Io(std::io::Error::other("event loop closed")))?;
        rx.recv().map_err(|_| ServerError::Io(std::io::Error::other("event loop closed")))?
    }

    pub fn disable_servers(&self, rules: Vec<ServerRule>) -> Result<(), ServerError> {
        self.set_enabled(rules, false)
    }

    pub fn enable_servers(&self, rules: Vec<ServerRule>) -> Result<(), ServerError> {
        self.set_enabled(rules, true)
    }

    pub fn delete_all_servers(&self) {
        let (tx, rx) = bounded(1);
        if self.cmd_tx.send(Command::DeleteAll(tx)).is_ok() {
            let _ = rx.recv();
        }
    }

    pub fn get_server_count(&self) -> usize {
        let (tx, rx) = bounded(1);
        if self.cmd_tx.send(Command::GetCount(tx)).is_ok() {
            rx.recv().unwrap_or(0)
        } else {
            0
        }
    }

    pub fn has_server(&self, rule: &ServerRule) -> bool {
        let (tx, rx) = bounded(1);
        if self.cmd_tx.send(Command::HasServer(rule.clone(), tx)).is_ok() {
            rx.recv().unwrap_or(false)
        } else {
            false
        }
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
        if let Some(handle) = self.thread.lock().expect("event loop handle mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}

struct EventLoop {
    poll: Poll,
    events: Events,
    cmd_rx: Receiver<Command>,
    listeners: HashMap<Token, ListenerSlot>,
    connections: HashMap<Token, Connection>,
    rule_tokens: HashMap<ServerRule, Token>,
    disabled: std::collections::HashSet<Token>,
    tls_config: Option<Arc<rustls::ServerConfig>>,
    next_token: AtomicUsize,
    running: bool,
}

impl EventLoop {
    fn new(cmd_rx: Receiver<Command>, tls_config: Option<Arc<rustls::ServerConfig>>) -> std::io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(EVENTS_CAPACITY),
            cmd_rx,
            listeners: HashMap::new(),
            connections: HashMap::new(),
            rule_tokens: HashMap::new(),
            disabled: std::collections::HashSet::new(),
            tls_config,
            next_token: AtomicUsize::new(1),
            running: true,
        })
    }

    fn next_token(&self) -> Token {
        Token(self.next_token.fetch_add(1, Ordering::Relaxed))
    }

    fn run(&mut self) {
        while self.running {
            while let Ok(cmd) = self.cmd_rx.try_recv() {
                self.apply(cmd);
            }
            if !self.running {
                break;
            }

            if let Err(e) = self.poll.poll(&mut self.events, Some(POLL_TIMEOUT)) {
                warn!(error = %e, "event loop poll failed");
                continue;
            }

            let ready: Vec<_> = self.events.iter().map(|e| (e.token(), e.is_readable(), e.is_writable())).collect();
            for (token, readable, writable) in ready {
                self.handle_event(token, readable, writable);
            }
        }

        info!("server event loop exiting");
    }

    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::AddServers(rules, reply) => {
                let result = self.add_servers(rules);
                let _ = reply.send(result);
            }
            Command::DeleteServers(rules, reply) => {
                let result = self.delete_servers(&rules);
                let _ = reply.send(result);
            }
            Command::DeleteAll(reply) => {
                self.delete_all();
                let _ = reply.send(());
            }
            Command::SetEnabled(rules, enabled, reply) => {
                let result = self.set_enabled(&rules, enabled);
                let _ = reply.send(result);
            }
            Command::GetCount(reply) => {
                let _ = reply.send(self.rule_tokens.len());
            }
            Command::HasServer(rule, reply) => {
                let _ = reply.send(self.rule_tokens.contains_key(&rule));
            }
            Command::Shutdown => {
                self.running = false;
            }
        }
    }

    fn add_servers(&mut self, rules: Vec<ServerRule>) -> Result<(), ServerError> {
        for rule in rules {
            // Adding a server that already exists is a no-op.
            if self.rule_tokens.contains_key(&rule) {
                continue;
            }

            let addr = resolve(&rule.endpoint, rule.port)?;
            let tls_config = matches!(rule.protocol, Protocol::Https)
                .then(|| self.tls_config.clone())
                .flatten();

            let mut slot = ListenerSlot::bind(rule.protocol, addr, tls_config)?;
            let token = self.next_token();
            register_listener(&self.poll, &mut slot, token)?;

            self.listeners.insert(token, slot);
            self.rule_tokens.insert(rule, token);
        }
        Ok(())
    }

    fn delete_servers(&mut self, rules: &[ServerRule]) -> Result<(), ServerError> {
        for rule in rules {
            let token = self.rule_tokens.remove(rule).ok_or(ServerError::RuleNotFound)?;
            if let Some(mut slot) = self.listeners.remove(&token) {
                deregister_listener(&self.poll, &mut slot);
            }
        }
        Ok(())
    }

    fn delete_all(&mut self) {
        for (_, mut slot) in self.listeners.drain() {
            deregister_listener(&self.poll, &mut slot);
        }
        self.rule_tokens.clear();
        self.connections.clear();
        self.disabled.clear();
    }

    fn set_enabled(&mut self, rules: &[ServerRule], enabled: bool) -> Result<(), ServerError> {
        for rule in rules {
            let token = *self.rule_tokens.get(rule).ok_or(ServerError::RuleNotFound)?;
            if enabled {
                self.disabled.remove(&token);
            } else {
                self.disabled.insert(token);
            }
        }
        Ok(())
    }

    fn handle_event(&mut self, token: Token, readable: bool, writable: bool) {
        if self.listeners.contains_key(&token) {
            if readable {
                self.accept_all(token);
            }
            return;
        }

        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        if readable {
            conn.on_readable();
        }
        if writable {
            conn.on_writable();
        }

        if conn.is_closed() {
            let mut conn = self.connections.remove(&token).expect("token checked above");
            let _ = self.poll.registry().deregister(&mut conn.stream);
        } else if conn.wants_write() {
            let _ = self.poll.registry().reregister(
                &mut conn.stream,
                token,
                Interest::READABLE | Interest::WRITABLE,
            );
        }
    }

    fn accept_all(&mut self, listener_token: Token) {
        // A disabled rule's listener stays bound (invariant 1 says nothing
        // about the socket), but no accepted connection is serviced and no
        // datagram is answered — invariant 2, "never executed".
        let disabled = self.disabled.contains(&listener_token);

        loop {
            let accepted = match self.listeners.get_mut(&listener_token) {
                Some(ListenerSlot::Tcp(listener)) => listener.accept().ok().map(|(s, _)| (s, ConnKind::Tcp)),
                Some(ListenerSlot::Http(listener)) => listener.accept().ok().map(|(s, _)| (s, ConnKind::Http)),
                Some(ListenerSlot::Https(listener, _)) => {
                    listener.accept().ok().map(|(s, _)| (s, ConnKind::Https))
                }
                Some(ListenerSlot::Udp(socket)) => {
                    if !disabled {
                        service_udp(socket);
                    }
                    return;
                }
                None => return,
            };

            let Some((mut stream, kind)) = accepted else {
                return;
            };

            if disabled {
                // Drop the accepted stream without registering it; the
                // `TcpStream`'s `Drop` closes the connection.
                continue;
            }

            let token = self.next_token();
            if self
                .poll
                .registry()
                .register(&mut stream, token, Interest::READABLE)
                .is_err()
            {
                continue;
            }

            let conn = match kind {
                ConnKind::Tcp => Connection::tcp_echo(stream),
                ConnKind::Http => Connection::http(stream),
                ConnKind::Https => {
                    let tls_config = match self.listeners.get(&listener_token) {
                        Some(ListenerSlot::Https(_, cfg)) => Arc::clone(cfg),
                        _ => continue,
                    };
                    Connection::https(stream, tls_config)
                }
            };

            self.connections.insert(token, conn);
        }
    }

}

fn service_udp(socket: &mio::net::UdpSocket) {
    let mut buf = [0u8; 4096];
    loop {
        match socket.recv_from(&mut buf) {
            Ok((n, src)) => {
                if let Err(e) = socket.send_to(&buf[..n], src) {
                    debug!(error = %e, "udp echo send failed");
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
            Err(e) => {
                debug!(error = %e, "udp recv failed");
                return;
            }
        }
    }
}

enum ConnKind {
    Tcp,
    Http,
    Https,
}

fn resolve(endpoint: &str, port: u16) -> Result<SocketAddr, ServerError> {
    (endpoint, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| ServerError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved")))
}

fn register_listener(poll: &Poll, slot: &mut ListenerSlot, token: Token) -> Result<(), ServerError> {
    match slot {
        ListenerSlot::Tcp(l) | ListenerSlot::Http(l) => {
            poll.registry().register(l, token, Interest::READABLE)?
        }
        ListenerSlot::Https(l, _) => poll.registry().register(l, token, Interest::READABLE)?,
        ListenerSlot::Udp(s) => poll.registry().register(s, token, Interest::READABLE)?,
    }
    Ok(())
}

fn deregister_listener(poll: &Poll, slot: &mut ListenerSlot) {
    let result = match slot {
        ListenerSlot::Tcp(l) | ListenerSlot::Http(l) => poll.registry().deregister(l),
        ListenerSlot::Https(l, _) => poll.registry().deregister(l),
        ListenerSlot::Udp(s) => poll.registry().deregister(s),
    };
    if let Err(e) = result {
        debug!(error = %e, "failed to deregister listener, continuing anyway");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_protocol::rules::Protocol;
    use std::net::TcpStream;

    #[test]
    fn add_and_delete_tcp_server_round_trips_rule_count() {
        let worker = ServerWorker::spawn(None);
        let rule = ServerRule::new("127.0.0.1", 58_421, Protocol::Tcp);

        worker.add_servers(vec![rule.clone()]).unwrap();
        assert_eq!(worker.get_server_count(), 1);
        assert!(worker.has_server(&rule));

        worker.delete_servers(vec![rule.clone()]).unwrap();
        assert_eq!(worker.get_server_count(), 0);
        assert!(!worker.has_server(&rule));

        worker.shutdown();
    }

    #[test]
    fn tcp_echo_server_echoes_bytes() {
        let worker = ServerWorker::spawn(None);
        let rule = ServerRule::new("127.0.0.1", 58_422, Protocol::Tcp);
        worker.add_servers(vec![rule]).unwrap();

        // Give the event loop a moment to register the listener.
        std::thread::sleep(Duration::from_millis(50));

        use std::io::{Read, Write};
        let mut stream = TcpStream::connect("127.0.0.1:58422").unwrap();
        stream.write_all(b"AXONPRB").unwrap();
        let mut buf = [0u8; 7];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"AXONPRB");

        worker.shutdown();
    }

    #[test]
    fn disabled_tcp_listener_accepts_and_immediately_closes() {
        let worker = ServerWorker::spawn(None);
        let rule = ServerRule::new("127.0.0.1", 58_423, Protocol::Tcp);
        worker.add_servers(vec![rule.clone()]).unwrap();
        worker.disable_servers(vec![rule]).unwrap();

        std::thread::sleep(Duration::from_millis(50));

        use std::io::{Read, Write};
        let mut stream = TcpStream::connect("127.0.0.1:58423").unwrap();
        let _ = stream.write_all(b"AXONPRB");
        let mut buf = [0u8; 7];
        let read = stream.read(&mut buf).unwrap_or(0);
        assert_eq!(read, 0, "a disabled listener must never echo back");

        worker.shutdown();
    }

    #[test]
    fn disable_servers_on_an_unknown_rule_is_an_error() {
        let worker = ServerWorker::spawn(None);
        let rule = ServerRule::new("127.0.0.1", 58_424, Protocol::Tcp);
        assert!(worker.disable_servers(vec![rule]).is_err());
        worker.shutdown();
    }
}
