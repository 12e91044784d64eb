//! Tunnel driver
//!
//! Owns the provider session and the map from logical tunnel name to live
//! tunnel. Each live tunnel runs its own accept loop task; every accepted
//! connection is handed to a [`ConnectionForwarder`] on a task of its own.
//!
//! The name map is guarded by an async mutex held across the provider
//! `listen`/`close` calls, so a create racing a delete for the same name is
//! serialized and a handle can neither be orphaned nor closed twice.

use crate::error::{AcceptError, TunnelError};
use crate::forwarder::{ConnectionForwarder, Destination};
use crate::session::{ProviderTunnel, Session, TunnelConfig};
use crate::tls::backend_tls_connector;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio_rustls::TlsConnector;
use tracing::{debug, error, info, warn};

type CloseAck = oneshot::Sender<Result<(), TunnelError>>;

/// Pause before accepting again after a transport error
pub(crate) const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Driver-side handle of an open tunnel
///
/// The provider tunnel itself is owned by the accept loop task; the driver
/// talks to it through `close_tx`.
struct LiveTunnel {
    id: String,
    labels: BTreeMap<String, String>,
    close_tx: oneshot::Sender<CloseAck>,
}

impl LiveTunnel {
    /// Asks the accept loop to close the provider tunnel and waits for the result.
    ///
    /// A loop that already ended (provider closed the tunnel) is treated as closed.
    async fn close(self) -> Result<(), TunnelError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.close_tx.send(ack_tx).is_err() {
            debug!(id = %self.id, "Accept loop already finished");
            return Ok(());
        }
        ack_rx.await.unwrap_or(Ok(()))
    }
}

/// Opens, replaces and closes named tunnels against one provider session
pub struct TunnelDriver {
    session: Arc<dyn Session>,
    tls: TlsConnector,
    tunnels: Mutex<HashMap<String, LiveTunnel>>,
}

impl std::fmt::Debug for TunnelDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelDriver").finish_non_exhaustive()
    }
}

impl TunnelDriver {
    /// Creates a driver on top of an established session.
    pub fn new(session: Arc<dyn Session>) -> Result<Self, TunnelError> {
        Ok(Self {
            session,
            tls: backend_tls_connector()?,
            tunnels: Mutex::new(HashMap::new()),
        })
    }

    /// Ensures a tunnel named `name` is open with exactly `labels`.
    ///
    /// Identical labels are a no-op. Otherwise a new tunnel is opened and
    /// installed first, and the previous tunnel under the same name (if any)
    /// is closed in the background afterwards. On error nothing is installed
    /// and the previous tunnel keeps serving.
    pub async fn create_tunnel(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
        destination: Destination,
    ) -> Result<(), TunnelError> {
        let mut tunnels = self.tunnels.lock().await;

        if let Some(existing) = tunnels.get(name) {
            if existing.labels == labels {
                debug!(tunnel = %name, id = %existing.id, "Tunnel already open with matching labels");
                return Ok(());
            }
        }

        let tunnel = self
            .session
            .listen(TunnelConfig {
                labels: labels.clone(),
                forwards_to: destination.address.clone(),
            })
            .await?;
        let id = tunnel.id().to_string();
        info!(tunnel = %name, id = %id, dest = %destination.address, "Tunnel opened");

        let forwarder = ConnectionForwarder::new(destination, self.tls.clone());
        let (close_tx, close_rx) = oneshot::channel();
        tokio::spawn(accept_loop(name.to_string(), tunnel, forwarder, close_rx));

        let previous = tunnels.insert(
            name.to_string(),
            LiveTunnel {
                id,
                labels,
                close_tx,
            },
        );

        if let Some(old) = previous {
            let name = name.to_string();
            tokio::spawn(async move {
                let old_id = old.id.clone();
                match old.close().await {
                    Ok(()) => info!(tunnel = %name, id = %old_id, "Replaced tunnel closed"),
                    Err(e) => warn!(tunnel = %name, id = %old_id, "Failed to close replaced tunnel: {}", e),
                }
            });
        }

        Ok(())
    }

    /// Closes and forgets the tunnel named `name`. Unknown names are a no-op.
    pub async fn delete_tunnel(&self, name: &str) -> Result<(), TunnelError> {
        let mut tunnels = self.tunnels.lock().await;
        let Some(tunnel) = tunnels.remove(name) else {
            debug!(tunnel = %name, "No tunnel to delete");
            return Ok(());
        };
        let id = tunnel.id.clone();
        tunnel.close().await?;
        info!(tunnel = %name, id = %id, "Tunnel closed");
        Ok(())
    }

    /// Names of all tunnels the driver currently holds, sorted
    pub async fn tunnel_names(&self) -> Vec<String> {
        let tunnels = self.tunnels.lock().await;
        let mut names: Vec<String> = tunnels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Labels of the tunnel named `name`, if one is held
    pub async fn tunnel_labels(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.tunnels.lock().await.get(name).map(|t| t.labels.clone())
    }

    /// Closes every tunnel. Close failures are logged, not returned.
    pub async fn shutdown(&self) {
        let drained: Vec<(String, LiveTunnel)> = self.tunnels.lock().await.drain().collect();
        for (name, tunnel) in drained {
            let id = tunnel.id.clone();
            if let Err(e) = tunnel.close().await {
                warn!(tunnel = %name, id = %id, "Failed to close tunnel during shutdown: {}", e);
            }
        }
        info!("All tunnels closed");
    }
}

/// Accepts connections until the tunnel is closed by us or by the provider.
///
/// A transport error pauses the loop for [`ACCEPT_RETRY_DELAY`]; a close
/// request is still honoured during the pause.
async fn accept_loop(
    name: String,
    mut tunnel: Box<dyn ProviderTunnel>,
    forwarder: ConnectionForwarder,
    mut close_rx: oneshot::Receiver<CloseAck>,
) {
    let id = tunnel.id().to_string();
    loop {
        tokio::select! {
            request = &mut close_rx => {
                close_on_request(&name, tunnel.as_mut(), request.ok()).await;
                break;
            }
            accepted = tunnel.accept() => match accepted {
                Ok(conn) => {
                    let remote_addr = conn
                        .remote_addr()
                        .map(|a| a.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    debug!(tunnel = %name, id = %id, remote_addr = %remote_addr, "Accepted connection");
                    let forwarder = forwarder.clone();
                    let name = name.clone();
                    tokio::spawn(async move {
                        if let Err(e) = forwarder.forward(conn).await {
                            error!(
                                tunnel = %name,
                                dest = %forwarder.destination().address,
                                remote_addr = %remote_addr,
                                "Connection failed: {}",
                                e
                            );
                        }
                    });
                }
                Err(AcceptError::Closed) => {
                    info!(tunnel = %name, id = %id, "Tunnel closed by provider, stopping accept loop");
                    break;
                }
                Err(AcceptError::Transport(e)) => {
                    warn!(
                        tunnel = %name,
                        id = %id,
                        "Accept failed, retrying in {}ms: {}",
                        ACCEPT_RETRY_DELAY.as_millis(),
                        e
                    );
                    tokio::select! {
                        request = &mut close_rx => {
                            close_on_request(&name, tunnel.as_mut(), request.ok()).await;
                            break;
                        }
                        _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => {}
                    }
                }
            }
        }
    }
}

/// Closes `tunnel` and acknowledges `ack`. Without an ack the driver was
/// dropped and the tunnel is closed anyway.
async fn close_on_request(name: &str, tunnel: &mut dyn ProviderTunnel, ack: Option<CloseAck>) {
    let result = tunnel.close().await;
    match ack {
        Some(ack) => {
            let _ = ack.send(result);
        }
        None => {
            if let Err(e) = result {
                warn!(tunnel = %name, id = %tunnel.id(), "Failed to close orphaned tunnel: {}", e);
            }
        }
    }
}
