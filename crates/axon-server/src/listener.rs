//! Binds the mio listener(s) backing one `ServerRule`.
//! HTTP(S) and TCP echo all listen on a TCP socket; only the kind of
//! `Connection` built on `accept()` differs.

use std::net::SocketAddr;
use std::sync::Arc;

use mio::net::{TcpListener, UdpSocket};
use socket2::{Domain, Socket, Type};

use axon_protocol::rules::Protocol;

use crate::error::ServerError;

pub enum ListenerSlot {
    Tcp(TcpListener),
    Http(TcpListener),
    Https(TcpListener, Arc<rustls::ServerConfig>),
    Udp(UdpSocket),
}

impl ListenerSlot {
    pub fn bind(
        protocol: Protocol,
        addr: SocketAddr,
        tls_config: Option<Arc<rustls::ServerConfig>>,
    ) -> Result<Self, ServerError> {
        match protocol {
            Protocol::Tcp => Ok(ListenerSlot::Tcp(bind_tcp(addr)?)),
            Protocol::Http => Ok(ListenerSlot::Http(bind_tcp(addr)?)),
            Protocol::Https => {
                let tls_config = tls_config
                    .ok_or_else(|| ServerError::Tls("no TLS config loaded for HTTPS listener".to_string()))?;
                Ok(ListenerSlot::Https(bind_tcp(addr)?, tls_config))
            }
            Protocol::Udp => Ok(ListenerSlot::Udp(bind_udp(addr)?)),
        }
    }
}

/// Multiple listeners may bind the same port across worker processes, so
/// `SO_REUSEPORT`/`SO_REUSEADDR` are enabled on every bind.
fn bind_tcp(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
    socket.set_nonblocking(true)?;
    socket.set_reuse_address(true)?;
    socket.set_reuse_port(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    Ok(TcpListener::from_std(socket.into()))
}

fn bind_udp(addr: SocketAddr) -> Result<UdpSocket, ServerError> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, None)?;
    socket.set_nonblocking(true)?;
    socket.set_reuse_address(true)?;
    socket.set_reuse_port(true)?;
    socket.bind(&addr.into())?;
    Ok(UdpSocket::from_std(socket.into()))
}
