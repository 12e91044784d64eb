//! Main controller implementation.
//!
//! Start-up order: cluster client, store seed, provider session, probe
//! server, watchers, then the sync loop (whose first pass is the initial
//! sync). A failure before the watchers start is fatal.

use crate::backoff::FibonacciBackoff;
use crate::cluster::{ClusterApi, KubeClusterApi, Managed};
use crate::config::Config;
use crate::error::ControllerError;
use crate::probes::serve_probes;
use crate::reconciler::Reconciler;
use crate::store::ResourceStore;
use crate::watcher::Watcher;
use crds::{Domain, HTTPSEdge, Tunnel};
use k8s_openapi::api::networking::v1::{Ingress, IngressClass};
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tunnel_driver::TunnelDriver;

/// Main controller for Ingress-derived tunnels.
pub struct Controller {
    ingress_watcher: JoinHandle<()>,
    ingress_class_watcher: JoinHandle<()>,
    domain_watcher: JoinHandle<()>,
    edge_watcher: JoinHandle<()>,
    tunnel_watcher: JoinHandle<()>,
    sync_loop: JoinHandle<()>,
    probe_server: JoinHandle<Result<(), ControllerError>>,
    driver: Option<Arc<TunnelDriver>>,
}

impl Controller {
    /// Creates a new controller instance and starts its background tasks.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing Ingress Controller");

        let kube_client = Client::try_default().await?;
        let cluster = KubeClusterApi::new(kube_client.clone(), config.watch_namespace.clone());

        let store = Arc::new(ResourceStore::new());
        store.seed(&cluster).await.map_err(ControllerError::Seed)?;

        let driver = connect_driver(&config).await?;

        let mut reconciler = Reconciler::new(Arc::clone(&store), config.reconciler_settings());
        if let Some(driver) = &driver {
            reconciler = reconciler.with_tunnel_manager(Arc::<TunnelDriver>::clone(driver));
        }
        let reconciler = Arc::new(reconciler);

        let probe_server = tokio::spawn(serve_probes(config.probe_addr, Arc::clone(&store)));

        let trigger = Arc::new(Notify::new());
        let watcher = Watcher::new(Arc::clone(&store), Arc::clone(&trigger));
        let namespace = config.watch_namespace.as_deref();
        let ingress_watcher = spawn_watcher::<Ingress>(&watcher, &kube_client, namespace);
        let ingress_class_watcher = spawn_watcher::<IngressClass>(&watcher, &kube_client, None);
        let domain_watcher = spawn_watcher::<Domain>(&watcher, &kube_client, namespace);
        let edge_watcher = spawn_watcher::<HTTPSEdge>(&watcher, &kube_client, namespace);
        let tunnel_watcher = spawn_watcher::<Tunnel>(&watcher, &kube_client, namespace);

        let sync_loop = tokio::spawn(run_sync_loop(reconciler, cluster, trigger, config.sync_debounce));

        Ok(Self {
            ingress_watcher,
            ingress_class_watcher,
            domain_watcher,
            edge_watcher,
            tunnel_watcher,
            sync_loop,
            probe_server,
            driver,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Ingress Controller running");

        // Background tasks should run forever
        let result = tokio::select! {
            result = &mut self.ingress_watcher => stopped("Ingress watcher", result),
            result = &mut self.ingress_class_watcher => stopped("IngressClass watcher", result),
            result = &mut self.domain_watcher => stopped("Domain watcher", result),
            result = &mut self.edge_watcher => stopped("HTTPSEdge watcher", result),
            result = &mut self.tunnel_watcher => stopped("Tunnel watcher", result),
            result = &mut self.sync_loop => stopped("Sync loop", result),
            result = &mut self.probe_server => match result {
                Ok(inner) => inner,
                Err(e) => Err(ControllerError::Probe(format!("Probe server panicked: {}", e))),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                Ok(())
            }
        };

        if let Some(driver) = &self.driver {
            driver.shutdown().await;
        }
        result
    }
}

fn stopped(task: &str, result: Result<(), tokio::task::JoinError>) -> Result<(), ControllerError> {
    match result {
        Ok(()) => Err(ControllerError::Watch(format!("{} stopped", task))),
        Err(e) => Err(ControllerError::Watch(format!("{} panicked: {}", task, e))),
    }
}

fn spawn_watcher<K: Managed>(watcher: &Watcher, client: &Client, namespace: Option<&str>) -> JoinHandle<()> {
    let watcher = watcher.clone();
    let api = K::api(client, namespace);
    tokio::spawn(async move { watcher.watch(api).await })
}

#[cfg(feature = "ngrok")]
async fn connect_driver(config: &Config) -> Result<Option<Arc<TunnelDriver>>, ControllerError> {
    use tunnel_driver::{NgrokOptions, NgrokSession};

    let options = NgrokOptions {
        authtoken: config.authtoken.clone(),
        server_addr: config.server_addr.clone(),
        ca_certs_dir: Some(config.ca_certs_dir.clone()),
    };
    let session = NgrokSession::connect(&options).await?;
    Ok(Some(Arc::new(TunnelDriver::new(Arc::new(session))?)))
}

#[cfg(not(feature = "ngrok"))]
async fn connect_driver(_config: &Config) -> Result<Option<Arc<TunnelDriver>>, ControllerError> {
    warn!("Built without the ngrok feature, live tunnels are disabled");
    Ok(None)
}

/// Longest debounce, as a multiple of the quiet period
const MAX_DEBOUNCE_FACTOR: u32 = 10;

/// Syncs once, then again after every debounced store change.
///
/// A failed pass is retried after a Fibonacci backoff even if nothing
/// changes; a clean pass resets the backoff. Steady changes delay a pass by
/// at most `MAX_DEBOUNCE_FACTOR` quiet periods.
pub(crate) async fn run_sync_loop<C: ClusterApi>(
    reconciler: Arc<Reconciler>,
    client: C,
    trigger: Arc<Notify>,
    debounce: Duration,
) {
    let mut backoff = FibonacciBackoff::default();

    loop {
        let retry = match reconciler.sync(&client).await {
            Ok(_) => {
                backoff.reset();
                None
            }
            Err(e) => {
                let delay = backoff.next_backoff();
                warn!("Sync failed, retrying in {}s: {}", delay.as_secs(), e);
                Some(delay)
            }
        };

        match retry {
            Some(delay) => {
                tokio::select! {
                    _ = trigger.notified() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => trigger.notified().await,
        }

        // Wait for a quiet period
        let deadline = tokio::time::Instant::now() + debounce * MAX_DEBOUNCE_FACTOR;
        loop {
            let wait = debounce.min(deadline.saturating_duration_since(tokio::time::Instant::now()));
            if wait.is_zero() || tokio::time::timeout(wait, trigger.notified()).await.is_err() {
                break;
            }
        }
    }
}
