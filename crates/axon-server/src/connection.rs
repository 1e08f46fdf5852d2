//! Per-connection state machines for the TCP echo, HTTP, and HTTPS
//! listeners. Driven by the event loop's readable/writable
//! notifications; a connection always closes itself after one
//! request/response cycle.

use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;

use mio::net::TcpStream;
use rustls::ServerConnection;
use tracing::{debug, warn};

use crate::http;

const READ_CHUNK: usize = 4096;

enum Kind {
    TcpEcho,
    Http,
    Https(Box<ServerConnection>),
}

/// One accepted TCP connection, possibly wrapped in TLS.
pub struct Connection {
    pub stream: TcpStream,
    kind: Kind,
    inbound: Vec<u8>,
    outbound: Vec<u8>,
    responded: bool,
    closed: bool,
}

impl Connection {
    pub fn tcp_echo(stream: TcpStream) -> Self {
        Self::new(stream, Kind::TcpEcho)
    }

    pub fn http(stream: TcpStream) -> Self {
        Self::new(stream, Kind::Http)
    }

    pub fn https(stream: TcpStream, tls_config: Arc<rustls::ServerConfig>) -> Self {
        let tls = ServerConnection::new(tls_config).expect("invalid rustls server config");
        Self::new(stream, Kind::Https(Box::new(tls)))
    }

    fn new(stream: TcpStream, kind: Kind) -> Self {
        Self {
            stream,
            kind,
            inbound: Vec::new(),
            outbound: Vec::new(),
            responded: false,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether the event loop should currently poll this connection for
    /// writability (there's buffered output, or TLS wants to write).
    pub fn wants_write(&self) -> bool {
        !self.outbound.is_empty()
            || matches!(&self.kind, Kind::Https(tls) if tls.wants_write())
    }

    pub fn on_readable(&mut self) {
        match &mut self.kind {
            Kind::TcpEcho => self.read_plain(),
            Kind::Http => self.read_plain(),
            Kind::Https(_) => self.read_tls(),
        }

        if !self.responded {
            self.try_produce_response();
        }
    }

    pub fn on_writable(&mut self) {
        match &mut self.kind {
            Kind::Https(_) => self.flush_tls(),
            _ => self.flush_plain(),
        }
    }

    fn read_plain(&mut self) {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    self.closed = true;
                    return;
                }
                Ok(n) => self.inbound.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) => {
                    debug!(error = %e, "connection read failed");
                    self.closed = true;
                    return;
                }
            }
        }
    }

    fn try_produce_response(&mut self) {
        match &self.kind {
            Kind::TcpEcho => {
                if !self.inbound.is_empty() {
                    self.outbound.extend_from_slice(&self.inbound);
                    self.inbound.clear();
                    self.responded = true;
                }
            }
            Kind::Http | Kind::Https(_) => {
                if http::has_complete_request_line(&self.inbound) {
                    self.outbound.extend_from_slice(&http::response_for(&self.inbound));
                    self.responded = true;
                }
            }
        }

        if self.responded {
            match &mut self.kind {
                Kind::Https(tls) => {
                    let mut pending = Vec::new();
                    std::mem::swap(&mut pending, &mut self.outbound);
                    if let Err(e) = tls.writer().write_all(&pending) {
                        warn!(error = %e, "tls write_all failed");
                        self.closed = true;
                    }
                }
                _ => self.flush_plain(),
            }
        }
    }

    fn flush_plain(&mut self) {
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => {
                    self.closed = true;
                    return;
                }
                Ok(n) => {
                    self.outbound.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) => {
                    debug!(error = %e, "connection write failed");
                    self.closed = true;
                    return;
                }
            }
        }
        if self.responded {
            self.closed = true;
        }
    }

    fn read_tls(&mut self) {
        let Kind::Https(tls) = &mut self.kind else { return };

        loop {
            match tls.read_tls(&mut self.stream) {
                Ok(0) => {
                    self.closed = true;
                    return;
                }
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!(error = %e, "tls read failed");
                    self.closed = true;
                    return;
                }
            }
        }

        if let Err(e) = tls.process_new_packets() {
            warn!(error = %e, "tls handshake/record processing failed");
            self.closed = true;
            return;
        }

        let mut plaintext = Vec::new();
        match tls.reader().read_to_end(&mut plaintext) {
            Ok(_) | Err(_) if !plaintext.is_empty() => self.inbound.extend_from_slice(&plaintext),
            _ => {}
        }
    }

    fn flush_tls(&mut self) {
        let Kind::Https(tls) = &mut self.kind else {
            self.flush_plain();
            return;
        };

        while tls.wants_write() {
            match tls.write_tls(&mut self.stream) {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) => {
                    debug!(error = %e, "tls write failed");
                    self.closed = true;
                    return;
                }
            }
        }

        if self.responded && !tls.wants_write() {
            self.closed = true;
        }
    }
}
