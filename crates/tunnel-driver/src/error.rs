//! Tunnel driver errors

use thiserror::Error;

/// Errors that can occur while managing tunnels or relaying connections
#[derive(Debug, Error)]
pub enum TunnelError {
    /// Establishing the provider session failed
    #[error("Session error: {0}")]
    Session(String),

    /// The provider refused to open a tunnel
    #[error("Failed to open tunnel: {0}")]
    Listen(String),

    /// The provider failed to close a tunnel
    #[error("Failed to close tunnel {id}: {reason}")]
    Close { id: String, reason: String },

    /// Dialing the in-cluster backend failed
    #[error("Failed to connect to {address}: {source}")]
    Dial {
        address: String,
        source: std::io::Error,
    },

    /// TLS configuration or handshake failure
    #[error("TLS error: {0}")]
    Tls(String),

    /// Custom CA certificates could not be loaded
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// IO error while relaying bytes
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by a tunnel's accept call
#[derive(Debug, Error)]
pub enum AcceptError {
    /// The tunnel was closed, by us or by the provider. Terminal for the
    /// accept loop.
    #[error("Tunnel closed")]
    Closed,

    /// A single accept attempt failed; the tunnel itself is still open
    #[error("Accept failed: {0}")]
    Transport(String),
}
