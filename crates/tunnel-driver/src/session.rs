//! Provider session abstraction
//!
//! These traits are the only surface the driver needs from a tunneling
//! provider. The ngrok SDK implements them behind the `ngrok` feature, and
//! tests use the in-memory session from the `mock` module.

use crate::error::{AcceptError, TunnelError};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// A raw connection accepted from a tunnel
pub trait TunnelConn: AsyncRead + AsyncWrite + Unpin + Send {
    /// Address of the remote peer, when the provider reports one
    fn remote_addr(&self) -> Option<SocketAddr>;
}

/// Boxed connection handed from a tunnel to the forwarder
pub type BoxedConn = Box<dyn TunnelConn>;

impl TunnelConn for TcpStream {
    fn remote_addr(&self) -> Option<SocketAddr> {
        self.peer_addr().ok()
    }
}

impl TunnelConn for tokio::io::DuplexStream {
    fn remote_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// What to open a tunnel with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    /// Labels edge routes select this tunnel by
    pub labels: BTreeMap<String, String>,
    /// Informational forwarding target reported to the provider
    pub forwards_to: String,
}

/// A live tunnel opened against a session
///
/// `accept` must be cancel-safe: the accept loop races it against close
/// requests and drops the pending call when a close wins.
#[async_trait::async_trait]
pub trait ProviderTunnel: Send {
    /// Provider-assigned tunnel identifier
    fn id(&self) -> &str;

    /// Labels the tunnel was opened with
    fn labels(&self) -> &BTreeMap<String, String>;

    /// Waits for the next connection. Returns [`AcceptError::Closed`] once
    /// the tunnel is gone.
    async fn accept(&mut self) -> Result<BoxedConn, AcceptError>;

    /// Closes the tunnel on the provider side
    async fn close(&mut self) -> Result<(), TunnelError>;
}

/// A provider session capable of opening tunnels
#[async_trait::async_trait]
pub trait Session: Send + Sync {
    /// Opens a tunnel; the tunnel is live once this returns
    async fn listen(&self, config: TunnelConfig) -> Result<Box<dyn ProviderTunnel>, TunnelError>;
}
