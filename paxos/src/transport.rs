//! UDP transport adapter: bind-with-probing, timed receive, send.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time;
use tracing::warn;

/// Receive buffer size; larger datagrams are truncated by the OS.
const MAX_DATAGRAM: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error("no bindable port at or above {0}")]
    PortsExhausted(u16),
}

/// The node's single datagram endpoint, held for the process lifetime
/// (or until an explicit rebind).
pub struct UdpTransport {
    socket: UdpSocket,
    port: u16,
    buf: Vec<u8>,
}

impl UdpTransport {
    /// Bind to `preferred`, probing upward one port at a time on conflict.
    /// Ports below 1024 are first clamped to 1024. `preferred = 0` asks the
    /// OS for an ephemeral port and does not probe.
    ///
    /// # Errors
    ///
    /// [`TransportError::PortsExhausted`] when probing runs off the end of
    /// the port range, or an [`io::Error`] for non-conflict failures on an
    /// ephemeral bind.
    pub async fn bind(preferred: u16) -> Result<Self, TransportError> {
        let mut port = preferred;
        let mut first_failure = true;
        loop {
            match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await {
                Ok(socket) => {
                    let port = socket.local_addr()?.port();
                    return Ok(Self {
                        socket,
                        port,
                        buf: vec![0; MAX_DATAGRAM],
                    });
                }
                Err(err) => {
                    if first_failure {
                        warn!(port, %err, "could not bind; probing upward");
                        first_failure = false;
                    }
                    if preferred == 0 {
                        return Err(err.into());
                    }
                    port = if port < 1024 {
                        1024
                    } else {
                        port.checked_add(1)
                            .ok_or(TransportError::PortsExhausted(preferred))?
                    };
                }
            }
        }
    }

    /// The locally bound port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Receive one datagram, waiting at most `timeout`. A timeout is a
    /// normal poll outcome, not an error, and yields `None` so the caller's
    /// loop can observe control actions between receives.
    pub async fn recv(&mut self, timeout: Duration) -> Option<(Vec<u8>, SocketAddr)> {
        match time::timeout(timeout, self.socket.recv_from(&mut self.buf)).await {
            Ok(Ok((len, source))) => Some((self.buf[..len].to_vec(), source)),
            Ok(Err(err)) => {
                warn!(%err, "receive failed");
                None
            }
            Err(_) => None,
        }
    }

    /// Send one datagram.
    ///
    /// # Errors
    ///
    /// Propagates the socket error; the caller logs and carries on (a lost
    /// datagram is indistinguishable from one the network dropped).
    pub async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> io::Result<()> {
        self.socket.send_to(bytes, dest).await.map(|_| ())
    }

    /// Move to a different port (the `port <n>` control action), probing
    /// upward on conflict. Requesting the current port is a no-op. On
    /// failure the existing socket is kept.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`bind`](Self::bind).
    pub async fn rebind(&mut self, preferred: u16) -> Result<(), TransportError> {
        if preferred != 0 && preferred == self.port {
            return Ok(());
        }
        *self = Self::bind(preferred).await?;
        Ok(())
    }
}

/// Best-effort discovery of the address peers can reach us at. A connected
/// UDP socket sends nothing, but the OS resolves the outward route for it.
/// Falls back to loopback.
#[must_use]
pub fn local_ip() -> IpAddr {
    std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|probe| {
            probe.connect(("8.8.8.8", 80))?;
            probe.local_addr()
        })
        .map_or(IpAddr::V4(Ipv4Addr::LOCALHOST), |addr| addr.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ephemeral_bind_reports_real_port() {
        let transport = UdpTransport::bind(0).await.unwrap();
        assert_ne!(transport.port(), 0);
    }

    #[tokio::test]
    async fn conflicting_bind_probes_upward() {
        let first = UdpTransport::bind(0).await.unwrap();
        let second = UdpTransport::bind(first.port()).await.unwrap();
        assert_ne!(second.port(), first.port());
        assert!(second.port() >= 1024);
    }

    #[tokio::test]
    async fn loopback_round_trip() {
        let mut receiver = UdpTransport::bind(0).await.unwrap();
        let sender = UdpTransport::bind(0).await.unwrap();
        let dest: SocketAddr = format!("127.0.0.1:{}", receiver.port()).parse().unwrap();

        sender.send_to(b"9000 connect", dest).await.unwrap();
        let (bytes, source) = receiver
            .recv(Duration::from_secs(5))
            .await
            .expect("datagram should arrive on loopback");
        assert_eq!(bytes, b"9000 connect");
        assert_eq!(source.port(), sender.port());
    }

    #[tokio::test]
    async fn timeout_is_a_normal_outcome() {
        let mut transport = UdpTransport::bind(0).await.unwrap();
        assert!(transport.recv(Duration::from_millis(50)).await.is_none());
    }
}
