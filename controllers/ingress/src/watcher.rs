//! Kubernetes resource watchers.
//!
//! One watch stream per tracked kind feeds the resource store. Every
//! notification becomes exactly one store call, after which the sync loop
//! is signalled. Watchers never reconcile themselves.

use crate::cluster::Managed;
use crate::store::{ObjectKey, ResourceStore};
use futures::StreamExt;
use kube::Api;
use kube_runtime::{WatchStreamExt, watcher};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Keeps the resource store in line with the cluster.
#[derive(Clone)]
pub struct Watcher {
    store: Arc<ResourceStore>,
    trigger: Arc<Notify>,
}

impl Watcher {
    /// Creates a watcher writing into `store` and signalling `trigger` on every change.
    pub fn new(store: Arc<ResourceStore>, trigger: Arc<Notify>) -> Self {
        Self { store, trigger }
    }

    /// Watches every object of kind `K` visible through `api`.
    ///
    /// Stream errors are retried with backoff; this only returns if the
    /// stream itself ends.
    pub async fn watch<K: Managed>(&self, api: Api<K>) {
        info!("Starting {} watcher", K::KIND);

        let mut stream = Box::pin(watcher(api, watcher::Config::default()).default_backoff());
        let mut relisted = HashSet::new();

        while let Some(result) = stream.next().await {
            match result {
                Ok(event) => self.handle_event(event, &mut relisted),
                Err(e) => warn!("{} watch error, retrying: {}", K::KIND, e),
            }
        }

        warn!("{} watch stream ended", K::KIND);
    }

    /// Applies one watch event to the store.
    ///
    /// `relisted` collects the keys seen during a relist so objects deleted
    /// while the watch was down can be dropped once it completes.
    pub fn handle_event<K: Managed>(&self, event: watcher::Event<K>, relisted: &mut HashSet<ObjectKey>) {
        match event {
            watcher::Event::Apply(obj) => {
                debug!("{} applied", ObjectKey::of(&obj));
                self.store.update_resource(obj);
                self.trigger.notify_one();
            }
            watcher::Event::Delete(obj) => {
                let key = ObjectKey::of(&obj);
                debug!("{} deleted", key);
                self.store.delete(&key);
                self.trigger.notify_one();
            }
            watcher::Event::Init => {
                debug!("{} relist started", K::KIND);
                relisted.clear();
            }
            watcher::Event::InitApply(obj) => {
                relisted.insert(ObjectKey::of(&obj));
                self.store.update_resource(obj);
                self.trigger.notify_one();
            }
            watcher::Event::InitDone => {
                let dropped = self.store.retain_kind(K::KIND, relisted);
                relisted.clear();
                if dropped > 0 {
                    info!("{} relist dropped {} stale object(s)", K::KIND, dropped);
                    self.trigger.notify_one();
                }
                debug!("{} relist complete", K::KIND);
            }
        }
    }
}
