//! Reconciler
//!
//! Makes the live Domain, HTTPSEdge and Tunnel objects match what the owned
//! Ingresses imply, then opens and closes live tunnels to match.
//!
//! A pass runs in this order:
//! 1. resolve owned Ingresses and derive the desired state
//! 2. create or update desired Domains, HTTPSEdges and Tunnels
//! 3. open a live tunnel for every desired Tunnel
//! 4. delete managed objects that are no longer desired
//! 5. close live tunnels that are no longer desired
//!
//! Deletions come last so a backend moving between identities always keeps
//! at least one tunnel. Only one pass runs at a time per [`Reconciler`].

mod apply;
mod derive;
mod tunnels;


pub use apply::{Derived, SyncSummary};
pub use derive::{ObjectRef, desired_state};
pub use tunnels::{TunnelManager, destination, live_tunnel_name};

use crate::cluster::ClusterApi;
use crate::error::SyncError;
use crate::ingress_class::owned_ingresses;
use crate::store::{Kind, ObjectKey, ResourceStore};
use apply::Applier;
use crds::{DEFAULT_CLUSTER_DOMAIN, Domain, HTTPSEdge, MANAGED_BY_LABEL, Tunnel};
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Names the reconciler writes and matches on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerSettings {
    /// Matched against `IngressClass.spec.controller`
    pub controller_name: String,
    /// Value of the managed-by label on derived objects
    pub manager_name: String,
    /// DNS suffix of in-cluster services
    pub cluster_domain: String,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            controller_name: "k8s.ngrok.com/ingress-controller".to_string(),
            manager_name: "ngrok-ingress-controller".to_string(),
            cluster_domain: DEFAULT_CLUSTER_DOMAIN.to_string(),
        }
    }
}

pub struct Reconciler {
    store: Arc<ResourceStore>,
    settings: ReconcilerSettings,
    tunnels: Option<Arc<dyn TunnelManager>>,
    sync_lock: Mutex<()>,
}

impl Reconciler {
    pub fn new(store: Arc<ResourceStore>, settings: ReconcilerSettings) -> Self {
        Self {
            store,
            settings,
            tunnels: None,
            sync_lock: Mutex::new(()),
        }
    }

    /// Drive live tunnels through `tunnels` on every pass
    pub fn with_tunnel_manager(mut self, tunnels: Arc<dyn TunnelManager>) -> Self {
        self.tunnels = Some(tunnels);
        self
    }

    /// Runs one reconciliation pass against `client`.
    ///
    /// A call made while another pass is running waits for it to finish.
    /// Per-object failures do not stop the pass; they are returned together
    /// once everything else has been applied.
    pub async fn sync<C: ClusterApi>(&self, client: &C) -> Result<SyncSummary, SyncError> {
        let _guard = self.sync_lock.lock().await;

        let ingresses = owned_ingresses(&self.store, &self.settings.controller_name);
        debug!("Sync: {} owned Ingress(es)", ingresses.len());
        let desired = desired_state(&ingresses, &self.settings);

        let live_domains = self.live::<Domain>();
        let live_edges = self.live::<HTTPSEdge>();
        let live_tunnels = self.live::<Tunnel>();

        let mut applier = Applier::new(client, &self.store);
        applier.upsert_all(&desired.domains, &live_domains).await;
        applier.upsert_all(&desired.edges, &live_edges).await;
        applier.upsert_all(&desired.tunnels, &live_tunnels).await;

        if let Some(tunnels) = &self.tunnels {
            open_tunnels(tunnels.as_ref(), &desired.tunnels, &mut applier).await;
        }

        applier.delete_stale(&desired.edges, &live_edges).await;
        applier.delete_stale(&desired.domains, &live_domains).await;
        applier.delete_stale(&desired.tunnels, &live_tunnels).await;

        if let Some(tunnels) = &self.tunnels {
            close_stale_tunnels(tunnels.as_ref(), &desired.tunnels, &mut applier).await;
        }

        let result = applier.finish();
        match &result {
            Ok(summary) if summary.changed() => info!(
                "Sync complete: {} created, {} updated, {} deleted, {} unchanged",
                summary.created, summary.updated, summary.deleted, summary.unchanged
            ),
            Ok(summary) => debug!("Sync complete, {} object(s) unchanged", summary.unchanged),
            Err(e) => error!("Sync finished with errors: {}", e),
        }
        result
    }

    /// Stored objects of kind `K` carrying our managed-by label
    fn live<K: Derived>(&self) -> BTreeMap<ObjectRef, K> {
        self.store
            .list_as::<K>()
            .into_iter()
            .filter(|obj| obj.labels().get(MANAGED_BY_LABEL) == Some(&self.settings.manager_name))
            .map(|obj| ((obj.namespace().unwrap_or_default(), obj.name_any()), obj))
            .collect()
    }
}

async fn open_tunnels<C: ClusterApi>(
    manager: &dyn TunnelManager,
    desired: &BTreeMap<ObjectRef, Tunnel>,
    applier: &mut Applier<'_, C>,
) {
    for ((namespace, name), tunnel) in desired {
        let live_name = live_tunnel_name(tunnel);
        if let Err(e) = manager
            .create_tunnel(&live_name, tunnel.spec.labels.clone(), destination(tunnel))
            .await
        {
            error!("Failed to open tunnel {}: {}", live_name, e);
            applier.fail(ObjectKey::new(Kind::Tunnel, namespace, name), e.to_string());
        }
    }
}

async fn close_stale_tunnels<C: ClusterApi>(
    manager: &dyn TunnelManager,
    desired: &BTreeMap<ObjectRef, Tunnel>,
    applier: &mut Applier<'_, C>,
) {
    let wanted: BTreeSet<String> = desired.values().map(live_tunnel_name).collect();
    for live_name in manager.tunnel_names().await {
        if wanted.contains(&live_name) {
            continue;
        }
        info!("Closing tunnel {}", live_name);
        if let Err(e) = manager.delete_tunnel(&live_name).await {
            error!("Failed to close tunnel {}: {}", live_name, e);
            let (namespace, name) = live_name.split_once('/').unwrap_or(("", live_name.as_str()));
            applier.fail(ObjectKey::new(Kind::Tunnel, namespace, name), e.to_string());
        }
    }
}
