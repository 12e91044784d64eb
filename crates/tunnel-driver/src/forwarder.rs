//! Per-connection relay between a tunnel and its in-cluster backend.
//!
//! Every accepted tunnel connection gets a fresh outbound connection to the
//! destination. Bytes are copied in both directions until one side closes;
//! the other direction is then dropped so neither socket is left half-open.

use crate::error::TunnelError;
use rustls::pki_types::ServerName;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Protocol spoken by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendProtocol {
    /// Plain TCP
    #[default]
    Tcp,
    /// TLS; the outbound connection is wrapped in a TLS client
    Tls,
}

impl BackendProtocol {
    /// Parses a protocol name. Unknown names fall back to TCP.
    pub fn parse(protocol: &str) -> Self {
        match protocol.to_ascii_lowercase().as_str() {
            "tls" | "https" => BackendProtocol::Tls,
            _ => BackendProtocol::Tcp,
        }
    }
}

/// Where a tunnel's connections are forwarded to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// `host:port` of the backend
    pub address: String,
    /// Backend protocol
    pub protocol: BackendProtocol,
}

impl Destination {
    /// Destination speaking `protocol` at `address`
    pub fn new(address: impl Into<String>, protocol: BackendProtocol) -> Self {
        Self {
            address: address.into(),
            protocol,
        }
    }

    /// Host part of the address
    pub fn host(&self) -> &str {
        match self.address.rsplit_once(':') {
            Some((host, _)) => host.trim_start_matches('[').trim_end_matches(']'),
            None => &self.address,
        }
    }

    /// Port part of the address, if present
    pub fn port(&self) -> Option<u16> {
        self.address
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse().ok())
    }

    /// Whether the backend connection must be wrapped in TLS.
    ///
    /// Port 443 is treated as HTTPS regardless of the declared protocol.
    pub fn needs_tls(&self) -> bool {
        self.protocol == BackendProtocol::Tls || self.port() == Some(443)
    }
}

/// Relays accepted tunnel connections to one destination
#[derive(Clone)]
pub struct ConnectionForwarder {
    destination: Destination,
    tls: TlsConnector,
}

impl std::fmt::Debug for ConnectionForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionForwarder")
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

impl ConnectionForwarder {
    /// Creates a forwarder for `destination`, wrapping in TLS with `tls` when needed.
    pub fn new(destination: Destination, tls: TlsConnector) -> Self {
        Self { destination, tls }
    }

    /// Destination this forwarder dials
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Handles one tunnel connection to completion.
    ///
    /// Dials the destination, optionally wraps it in TLS, and relays until
    /// either side closes. Both sides are closed when this returns.
    pub async fn forward<C>(&self, conn: C) -> Result<(), TunnelError>
    where
        C: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let backend = TcpStream::connect(&self.destination.address)
            .await
            .map_err(|source| TunnelError::Dial {
                address: self.destination.address.clone(),
                source,
            })?;

        if self.destination.needs_tls() {
            let server_name = ServerName::try_from(self.destination.host().to_string())
                .map_err(|e| TunnelError::Tls(format!("Invalid server name {}: {}", self.destination.host(), e)))?;
            let backend = self
                .tls
                .connect(server_name, backend)
                .await
                .map_err(|e| TunnelError::Tls(format!("Handshake with {} failed: {}", self.destination.address, e)))?;
            relay(conn, backend).await?;
        } else {
            relay(conn, backend).await?;
        }

        Ok(())
    }
}

/// Copies bytes between `tunnel` and `backend` in both directions.
///
/// Returns once either direction reaches EOF or fails. The other direction
/// is dropped at that point and both write halves are shut down, so a peer
/// that never closes cannot hold the connection open. Errors that only mean
/// "the peer already went away" are reported as a normal close.
pub async fn relay<A, B>(tunnel: A, backend: B) -> io::Result<()>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut tunnel_rd, mut tunnel_wr) = tokio::io::split(tunnel);
    let (mut backend_rd, mut backend_wr) = tokio::io::split(backend);

    let first = {
        let to_backend = tokio::io::copy(&mut tunnel_rd, &mut backend_wr);
        let to_tunnel = tokio::io::copy(&mut backend_rd, &mut tunnel_wr);
        tokio::select! {
            result = to_backend => {
                debug!("Tunnel side finished first");
                result
            }
            result = to_tunnel => {
                debug!("Backend side finished first");
                result
            }
        }
    };

    // Best effort; the peer may already be gone.
    let _ = backend_wr.shutdown().await;
    let _ = tunnel_wr.shutdown().await;

    match first {
        Ok(_) => Ok(()),
        Err(e) if is_closed_error(&e) => Ok(()),
        Err(e) => Err(e),
    }
}

fn is_closed_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}
