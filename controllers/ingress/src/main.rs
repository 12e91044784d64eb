//! Ingress Controller
//!
//! Exposes cluster services through provider tunnels.
//!
//! This controller watches `Ingress` and `IngressClass` objects, derives
//! `Domain`, `HTTPSEdge` and `Tunnel` CRDs from the Ingresses it owns, and
//! keeps one live provider tunnel open per derived Tunnel.

mod annotations;
mod backoff;
mod cluster;
mod config;
mod controller;
mod error;
mod ingress_class;
mod probes;
mod reconciler;
mod store;
mod watcher;

#[cfg(test)]
mod ingress_class_test;
#[cfg(test)]
mod test_utils;

use crate::config::Config;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting Ingress Controller");

    let config = Config::from_env()?;

    info!("Configuration:");
    info!("  Controller name: {}", config.controller_name);
    info!("  Manager name: {}", config.manager_name);
    info!("  Namespace: {}", config.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Cluster domain: {}", config.cluster_domain);
    info!("  Sync debounce: {}s", config.sync_debounce.as_secs());
    info!("  Probe address: {}", config.probe_addr);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
