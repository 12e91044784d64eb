//! Tunnel driver
//!
//! Keeps named tunnels open against a provider session and relays every
//! accepted connection to its in-cluster backend.

pub mod driver;
pub mod error;
pub mod forwarder;
pub mod session;
pub mod tls;

#[cfg(feature = "ngrok")]
pub mod ngrok_session;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;


pub use driver::TunnelDriver;
pub use error::{AcceptError, TunnelError};
pub use forwarder::{BackendProtocol, ConnectionForwarder, Destination, relay};
pub use session::{BoxedConn, ProviderTunnel, Session, TunnelConfig, TunnelConn};

#[cfg(feature = "ngrok")]
pub use ngrok_session::{NgrokOptions, NgrokSession};

#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockSession, SessionEvent};
