//! Live tunnels driven from the reconciler

use crds::Tunnel;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tunnel_driver::{BackendProtocol, Destination, TunnelDriver, TunnelError};

/// Opens and closes live tunnels for desired Tunnel objects
#[async_trait::async_trait]
pub trait TunnelManager: Send + Sync {
    /// Ensures a tunnel named `name` is open with `labels`, forwarding to `destination`
    async fn create_tunnel(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
        destination: Destination,
    ) -> Result<(), TunnelError>;

    /// Closes the tunnel named `name`, if any
    async fn delete_tunnel(&self, name: &str) -> Result<(), TunnelError>;

    /// Names of every open tunnel
    async fn tunnel_names(&self) -> Vec<String>;
}

#[async_trait::async_trait]
impl TunnelManager for TunnelDriver {
    async fn create_tunnel(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
        destination: Destination,
    ) -> Result<(), TunnelError> {
        TunnelDriver::create_tunnel(self, name, labels, destination).await
    }

    async fn delete_tunnel(&self, name: &str) -> Result<(), TunnelError> {
        TunnelDriver::delete_tunnel(self, name).await
    }

    async fn tunnel_names(&self) -> Vec<String> {
        TunnelDriver::tunnel_names(self).await
    }
}

/// Driver-side name of the live tunnel for `tunnel`
pub fn live_tunnel_name(tunnel: &Tunnel) -> String {
    format!("{}/{}", tunnel.namespace().unwrap_or_default(), tunnel.name_any())
}

/// Where connections for `tunnel` are forwarded
pub fn destination(tunnel: &Tunnel) -> Destination {
    Destination::new(
        tunnel.spec.forwards_to.clone(),
        BackendProtocol::parse(tunnel.spec.protocol()),
    )
}
