//! Per-protocol probe behavior.
//!
//! A bind-with-timeout, send/recv, `WouldBlock`-as-timeout shape shared
//! across TCP/UDP/HTTP/HTTPS, with `ureq` handling the HTTP(S) case.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::ClientError;

/// Socket operation timeout.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay before the single retry allowed per probe.
const RETRY_DELAY: Duration = Duration::from_millis(500);

const TCP_PAYLOAD: &[u8; 7] = b"AXONPRB";
const PACKET_SIZE: usize = 4096;

fn resolve_first(destination: &str, port: u16) -> std::io::Result<std::net::SocketAddr> {
    (destination, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved"))
}

/// Open a socket (with the probe timeout), connect, send the fixed 7-byte
/// payload, receive up to `PACKET_SIZE`, close. One retry after 500ms.
pub fn probe_tcp(destination: &str, port: u16) -> bool {
    with_one_retry(|| try_probe_tcp(destination, port))
}

fn try_probe_tcp(destination: &str, port: u16) -> Result<(), ClientError> {
    let addr = resolve_first(destination, port)?;
    let mut stream = TcpStream::connect_timeout(&addr, PROBE_TIMEOUT)?;
    stream.set_read_timeout(Some(PROBE_TIMEOUT))?;
    stream.set_write_timeout(Some(PROBE_TIMEOUT))?;

    stream.write_all(TCP_PAYLOAD)?;

    let mut buf = [0u8; PACKET_SIZE];
    stream.read(&mut buf)?;
    Ok(())
}

/// Send-to/recv-from on the worker's single shared datagram socket, same
/// retry policy as TCP. The socket is held behind a mutex and locked for
/// the full send+recv round trip, so it's used serially within each probe
/// cycle rather than concurrently across dispatch threads.
pub fn probe_udp(socket: &Mutex<UdpSocket>, destination: &str, port: u16) -> bool {
    with_one_retry(|| try_probe_udp(socket, destination, port))
}

fn try_probe_udp(socket: &Mutex<UdpSocket>, destination: &str, port: u16) -> Result<(), ClientError> {
    let addr = resolve_first(destination, port)?;
    let socket = socket.lock().expect("udp probe socket mutex poisoned");

    socket.send_to(TCP_PAYLOAD, addr)?;

    let mut buf = [0u8; PACKET_SIZE];
    match socket.recv_from(&mut buf) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
            Err(ClientError::Transport(e))
        }
        Err(e) => Err(ClientError::Transport(e)),
    }
}

/// `GET /` with `Connection: close`; success iff status == 200. `agent` is
/// reused across the rule's `request_count` iterations so HTTP keep-alive
/// state (when the server permits it) amortizes across probes.
pub fn probe_http(agent: &ureq::Agent, destination: &str, port: u16, https: bool) -> bool {
    with_one_retry(|| try_probe_http(agent, destination, port, https))
}

fn try_probe_http(agent: &ureq::Agent, destination: &str, port: u16, https: bool) -> Result<(), ClientError> {
    let scheme = if https { "https" } else { "http" };
    let url = format!("{scheme}://{destination}:{port}/");

    debug!(url = %url, "issuing probe request");
    let response = agent
        .get(&url)
        .header("Connection", "close")
        .call()
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    let status = response.status().as_u16();
    trace!(status, "probe response received");

    if status == 200 {
        Ok(())
    } else {
        Err(ClientError::Protocol(status))
    }
}

fn with_one_retry<F: Fn() -> Result<(), ClientError>>(attempt: F) -> bool {
    if attempt().is_ok() {
        return true;
    }
    std::thread::sleep(RETRY_DELAY);
    attempt().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn tcp_probe_succeeds_against_a_responsive_echo_server() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 7];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(&buf).unwrap();
        });

        assert!(probe_tcp(&addr.ip().to_string(), addr.port()));
        handle.join().unwrap();
    }

    #[test]
    fn tcp_probe_fails_against_nothing_listening() {
        assert!(!probe_tcp("127.0.0.1", 1));
    }
}
