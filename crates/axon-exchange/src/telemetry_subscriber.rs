//! `TelemetrySubscriber`: emits line-protocol metric points to an external
//! time-series endpoint.
//!
//! The UDP client is grounded on
//! `metrics-exporter-dogstatsd::forwarder::sync::Client::Udp`'s
//! bind-then-connect-then-send pattern: bind an ephemeral local socket once,
//! `connect()` it to the remote address, and `send()` each payload as a
//! connected-socket write. `UdpSocket::send` is a synchronous syscall, so
//! each dispatch runs inside `spawn_blocking`.

use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Mutex;

use async_trait::async_trait;
use axon_common::ClockSource;
use axon_protocol::metric_key::Outcome;

use crate::error::SubscriberError;
use crate::subscriber::{Batch, Subscriber};

pub struct TelemetrySubscriber {
    socket: Mutex<UdpSocket>,
    clock: ClockSource,
}

impl TelemetrySubscriber {
    pub fn connect(remote: SocketAddr, clock: ClockSource) -> std::io::Result<Self> {
        let socket = UdpSocket::bind((remote.ip().is_ipv4().then(|| "0.0.0.0").unwrap_or("::"), 0))?;
        socket.connect(remote)?;
        Ok(Self {
            socket: Mutex::new(socket),
            clock,
        })
    }

    fn send_line(socket: &UdpSocket, line: &str) -> std::io::Result<()> {
        socket.send(line.as_bytes())?;
        Ok(())
    }
}

/// Render one line-protocol point: `name value timestamp tag=val ...`.
fn line(name: &str, value: u64, timestamp: u64, tags: &[(&str, &str)]) -> String {
    let mut out = format!("{name} {value} {timestamp}");
    for (k, v) in tags {
        out.push(' ');
        out.push_str(k);
        out.push('=');
        out.push_str(v);
    }
    out
}

#[async_trait]
impl Subscriber for TelemetrySubscriber {
    async fn handle(&self, batch: Batch) -> Result<(), SubscriberError> {
        if batch.is_empty() {
            return Ok(());
        }

        let now = self.clock.epoch_seconds();
        let mut lines = Vec::with_capacity(batch.len() + 3);

        let mut total_success = 0u64;
        let mut total_failure = 0u64;
        let mut per_protocol: HashMap<&'static str, (u64, u64)> = HashMap::new();

        for (key, count) in &batch {
            let port = key.port.to_string();
            let connected = key.connected.to_string();
            let tags = [
                ("source", key.source.as_str()),
                ("destination", key.destination.as_str()),
                ("port", port.as_str()),
                ("protocol", &key.protocol.to_string()),
                ("connected", connected.as_str()),
            ];

            let metric = match key.outcome {
                Outcome::Success => "axon.traffic.request.success",
                Outcome::Failure => "axon.traffic.request.failure",
            };
            lines.push(line(metric, *count, now, &tags));

            match key.outcome {
                Outcome::Success => total_success += count,
                Outcome::Failure => total_failure += count,
            }

            let protocol_name: &'static str = match key.protocol {
                axon_protocol::Protocol::Tcp => "tcp",
                axon_protocol::Protocol::Udp => "udp",
                axon_protocol::Protocol::Http => "http",
                axon_protocol::Protocol::Https => "https",
            };
            let entry = per_protocol.entry(protocol_name).or_insert((0, 0));
            match key.outcome {
                Outcome::Success => entry.0 += count,
                Outcome::Failure => entry.1 += count,
            }
        }

        lines.push(line("axon.traffic.request.total.success", total_success, now, &[]));
        lines.push(line("axon.traffic.request.total.failure", total_failure, now, &[]));

        for (protocol, (success, failure)) in &per_protocol {
            lines.push(line(
                &format!("axon.traffic.{protocol}.request.success"),
                *success,
                now,
                &[],
            ));
            lines.push(line(
                &format!("axon.traffic.{protocol}.request.failure"),
                *failure,
                now,
                &[],
            ));
        }

        let socket = self.socket.lock().expect("telemetry socket mutex poisoned").try_clone()?;
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            for l in &lines {
                Self::send_line(&socket, l)?;
            }
            Ok(())
        })
        .await
        .expect("telemetry send task panicked")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_protocol_point_includes_tags_in_order() {
        let rendered = line(
            "axon.traffic.request.success",
            3,
            1_000,
            &[("source", "a"), ("destination", "b")],
        );
        assert_eq!(rendered, "axon.traffic.request.success 3 1000 source=a destination=b");
    }

    #[tokio::test]
    async fn handle_sends_per_key_total_and_per_protocol_lines() {
        use axon_protocol::{MetricKey, Protocol};

        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr().unwrap();
        server.set_read_timeout(Some(std::time::Duration::from_secs(2))).unwrap();

        let subscriber = TelemetrySubscriber::connect(server_addr, ClockSource::default()).unwrap();

        let mut batch = Batch::new();
        batch.insert(MetricKey::new("s", "d", 80, Protocol::Http, true, Outcome::Success), 3);

        subscriber.handle(batch).await.unwrap();

        let mut received = 0;
        let mut buf = [0u8; 512];
        // One line for the key itself, two totals, two per-protocol lines.
        while received < 5 {
            server.recv(&mut buf).unwrap();
            received += 1;
        }
        assert_eq!(received, 5);
    }
}
