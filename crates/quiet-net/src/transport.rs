//! The datagram transport boundary (spec §6).
//!
//! The core pipeline only needs `send`/`receive` over raw bytes; framing,
//! circuit construction, and QUIC multiplexing are the teacher's concerns,
//! not this protocol's — `quietd`'s handlers build and parse the wire
//! format themselves (`transit_key_id(32) ‖ transit_ciphertext`). This
//! module provides the trait plus a real `UdpTransport`.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::warn;

/// Datagrams larger than this are rejected by real transports (spec §6).
pub const MAX_DATAGRAM_BYTES: usize = 600;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("datagram too large: {0} bytes (max {MAX_DATAGRAM_BYTES})")]
    TooLarge(usize),
}

/// A single inbound datagram plus the metadata the pipeline needs to seed
/// an envelope (spec §4.3.1).
#[derive(Clone, Debug)]
pub struct Inbound {
    pub raw_data: Vec<u8>,
    pub origin_ip: String,
    pub origin_port: u16,
    pub received_at: i64,
}

/// The capability the core pipeline needs from the network. Delivery may
/// reorder, drop, or duplicate — the pipeline's dependency resolution and
/// content addressing are what make that safe.
///
/// Callers hold this behind a generic type parameter rather than `dyn
/// Transport`: native `async fn` in traits isn't dyn-compatible, and the
/// pipeline only ever runs against one concrete transport per process
/// (a real `UdpTransport`, or a test double), so there's no need to pay for
/// dynamic dispatch or pull in an extra crate for trait-object support.
pub trait Transport: Send + Sync {
    /// Fire-and-forget send. `due_ms` is advisory earliest-send ordering;
    /// a best-effort transport may ignore it.
    fn send(
        &self,
        dest_ip: &str,
        dest_port: u16,
        raw_data: Vec<u8>,
        due_ms: Option<i64>,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Poll for newly arrived datagrams since the last call.
    fn receive(&self) -> impl std::future::Future<Output = Result<Vec<Inbound>, TransportError>> + Send;
}

/// A real UDP-backed transport.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub async fn bind(listen_addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(listen_addr).await?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transport for UdpTransport {
    async fn send(
        &self,
        dest_ip: &str,
        dest_port: u16,
        raw_data: Vec<u8>,
        _due_ms: Option<i64>,
    ) -> Result<(), TransportError> {
        if raw_data.len() > MAX_DATAGRAM_BYTES {
            return Err(TransportError::TooLarge(raw_data.len()));
        }
        let addr: SocketAddr = format!("{dest_ip}:{dest_port}")
            .parse()
            .map_err(|e| TransportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;
        self.socket.send_to(&raw_data, addr).await?;
        Ok(())
    }

    async fn receive(&self) -> Result<Vec<Inbound>, TransportError> {
        let mut buf = [0u8; 2048];
        let mut out = Vec::new();
        // Drain whatever is currently queued on the socket without blocking
        // the caller indefinitely; the scheduler/runner calls this on a tick.
        loop {
            match self.socket.try_recv_from(&mut buf) {
                Ok((len, addr)) => {
                    if len > MAX_DATAGRAM_BYTES {
                        warn!(len, "dropping oversized datagram");
                        continue;
                    }
                    out.push(Inbound {
                        raw_data: buf[..len].to_vec(),
                        origin_ip: addr.ip().to_string(),
                        origin_port: addr.port(),
                        received_at: now_ms(),
                    });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(out)
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn udp_transport_round_trips_a_datagram() {
        let a = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b_addr = b.local_addr().unwrap();

        a.send(&b_addr.ip().to_string(), b_addr.port(), b"hello".to_vec(), None)
            .await
            .unwrap();

        // Give the datagram a moment to arrive.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let inbound = b.receive().await.unwrap();
        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].raw_data, b"hello");
    }

    #[tokio::test]
    async fn send_rejects_oversized_datagram() {
        let a = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let oversized = vec![0u8; MAX_DATAGRAM_BYTES + 1];
        let err = a.send("127.0.0.1", 1, oversized, None).await.unwrap_err();
        assert!(matches!(err, TransportError::TooLarge(_)));
    }
}
