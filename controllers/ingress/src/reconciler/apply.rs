//! Writes desired objects to the cluster.
//!
//! Every write outcome is recorded in the store so the next pass sees it
//! even before the watch event arrives. Failures are collected per object
//! and never stop the rest of the pass.

use super::derive::ObjectRef;
use crate::cluster::{ClusterApi, Managed};
use crate::error::{ClientError, ObjectFailure, SyncError};
use crate::store::{ObjectKey, ResourceStore};
use crds::{Domain, HTTPSEdge, Tunnel};
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// A derived resource whose spec the controller owns
pub trait Derived: Managed {
    /// Whether `self` already has the spec of `desired`
    fn spec_matches(&self, desired: &Self) -> bool;

    /// Copies the spec of `desired` onto `self`
    fn set_spec_from(&mut self, desired: &Self);
}

impl Derived for Domain {
    fn spec_matches(&self, desired: &Self) -> bool {
        self.spec == desired.spec
    }

    fn set_spec_from(&mut self, desired: &Self) {
        self.spec = desired.spec.clone();
    }
}

impl Derived for HTTPSEdge {
    fn spec_matches(&self, desired: &Self) -> bool {
        self.spec == desired.spec
    }

    fn set_spec_from(&mut self, desired: &Self) {
        self.spec = desired.spec.clone();
    }
}

impl Derived for Tunnel {
    fn spec_matches(&self, desired: &Self) -> bool {
        self.spec == desired.spec
    }

    fn set_spec_from(&mut self, desired: &Self) {
        self.spec = desired.spec.clone();
    }
}

/// Applies `desired` onto a live copy: spec plus our labels. Other metadata is kept.
fn adopt<K: Derived>(live: &mut K, desired: &K) {
    live.set_spec_from(desired);
    live.labels_mut().extend(desired.labels().clone());
}

/// Counts of what one pass did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl SyncSummary {
    /// Whether the pass wrote anything
    pub fn changed(&self) -> bool {
        self.created + self.updated + self.deleted > 0
    }
}

enum Written<K> {
    Created(K),
    Updated(K),
}

/// Applies one pass worth of writes
pub(crate) struct Applier<'a, C> {
    client: &'a C,
    store: &'a ResourceStore,
    summary: SyncSummary,
    failures: Vec<ObjectFailure>,
}

impl<'a, C: ClusterApi> Applier<'a, C> {
    pub(crate) fn new(client: &'a C, store: &'a ResourceStore) -> Self {
        Self {
            client,
            store,
            summary: SyncSummary::default(),
            failures: Vec::new(),
        }
    }

    /// Records a failure not tied to a cluster write
    pub(crate) fn fail(&mut self, key: ObjectKey, reason: String) {
        self.failures.push(ObjectFailure {
            kind: key.kind,
            namespace: key.namespace,
            name: key.name,
            reason,
        });
    }

    /// Creates every desired object missing from `live` and updates those whose spec differs.
    pub(crate) async fn upsert_all<K: Derived>(
        &mut self,
        desired: &BTreeMap<ObjectRef, K>,
        live: &BTreeMap<ObjectRef, K>,
    ) {
        for (id, want) in desired {
            self.upsert(want, live.get(id)).await;
        }
    }

    /// Deletes every object in `live` that is not in `desired`.
    pub(crate) async fn delete_stale<K: Derived>(
        &mut self,
        desired: &BTreeMap<ObjectRef, K>,
        live: &BTreeMap<ObjectRef, K>,
    ) {
        for (id, obj) in live {
            if !desired.contains_key(id) {
                self.delete(obj).await;
            }
        }
    }

    async fn upsert<K: Derived>(&mut self, desired: &K, live: Option<&K>) {
        let key = ObjectKey::of(desired);

        let result = match live {
            Some(current) if current.spec_matches(desired) => {
                debug!("{} is up to date", key);
                self.summary.unchanged += 1;
                return;
            }
            Some(current) => self.update(current.clone(), desired).await.map(Written::Updated),
            None => self.create(desired).await,
        };

        match result {
            Ok(Written::Created(obj)) => {
                info!("Created {}", key);
                self.summary.created += 1;
                self.store.update_resource(obj);
            }
            Ok(Written::Updated(obj)) => {
                info!("Updated {}", key);
                self.summary.updated += 1;
                self.store.update_resource(obj);
            }
            Err(e) => {
                error!("Failed to apply {}: {}", key, e);
                self.fail(key, e.to_string());
            }
        }
    }

    /// Replaces `current` with the desired spec, retrying once on a conflict.
    async fn update<K: Derived>(&self, mut current: K, desired: &K) -> Result<K, ClientError> {
        adopt(&mut current, desired);
        match self.client.replace(&current).await {
            Err(e) if e.is_conflict() => {
                warn!("Conflict updating {}, retrying with a fresh copy", ObjectKey::of(desired));
                self.replace_fresh(desired).await
            }
            other => other,
        }
    }

    /// Creates `desired`. If it already exists, takes the existing object over.
    async fn create<K: Derived>(&self, desired: &K) -> Result<Written<K>, ClientError> {
        match self.client.create(desired).await {
            Ok(obj) => Ok(Written::Created(obj)),
            Err(e) if e.is_conflict() => {
                warn!("{} already exists, adopting it", ObjectKey::of(desired));
                self.replace_fresh(desired).await.map(Written::Updated)
            }
            Err(e) => Err(e),
        }
    }

    async fn replace_fresh<K: Derived>(&self, desired: &K) -> Result<K, ClientError> {
        let namespace = desired.namespace().unwrap_or_default();
        let mut fresh: K = self.client.get(&namespace, &desired.name_any()).await?;
        adopt(&mut fresh, desired);
        self.client.replace(&fresh).await
    }

    async fn delete<K: Derived>(&mut self, obj: &K) {
        let key = ObjectKey::of(obj);
        match self.client.delete::<K>(&key.namespace, &key.name).await {
            Ok(()) => {
                info!("Deleted {}", key);
                self.summary.deleted += 1;
                self.store.delete(&key);
            }
            Err(e) if e.is_not_found() => {
                debug!("{} already gone", key);
                self.store.delete(&key);
            }
            Err(e) => {
                error!("Failed to delete {}: {}", key, e);
                self.fail(key, e.to_string());
            }
        }
    }

    /// Summary of the pass, or every failure it collected
    pub(crate) fn finish(self) -> Result<SyncSummary, SyncError> {
        if self.failures.is_empty() {
            Ok(self.summary)
        } else {
            Err(SyncError::Objects(self.failures))
        }
    }
}
