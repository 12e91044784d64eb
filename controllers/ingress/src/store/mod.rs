//! Resource store
//!
//! In-memory cache of every cluster object the controller acts on, keyed by
//! kind, namespace and name. Watchers write into it; the reconciler reads
//! from it. Readers always get copies, so nothing handed out can change
//! under them or be used to change the store.

use crate::cluster::{ClusterApi, Managed};
use crate::error::ClientError;
use crds::{Domain, HTTPSEdge, Tunnel};
use k8s_openapi::api::networking::v1::{Ingress, IngressClass};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info};


/// Kinds of tracked objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Ingress,
    IngressClass,
    Domain,
    HTTPSEdge,
    Tunnel,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Ingress => "Ingress",
            Kind::IngressClass => "IngressClass",
            Kind::Domain => "Domain",
            Kind::HTTPSEdge => "HTTPSEdge",
            Kind::Tunnel => "Tunnel",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a tracked object. Cluster-scoped objects have an empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub kind: Kind,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: Kind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a typed resource
    pub fn of<K: Managed>(obj: &K) -> Self {
        let meta = obj.meta();
        Self::new(
            K::KIND,
            meta.namespace.clone().unwrap_or_default(),
            meta.name.clone().unwrap_or_default(),
        )
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{} {}", self.kind, self.name)
        } else {
            write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
        }
    }
}

/// A stored object of any tracked kind
#[derive(Debug, Clone, PartialEq)]
pub enum TrackedObject {
    Ingress(Ingress),
    IngressClass(IngressClass),
    Domain(Domain),
    HTTPSEdge(HTTPSEdge),
    Tunnel(Tunnel),
}

impl TrackedObject {
    pub fn kind(&self) -> Kind {
        match self {
            TrackedObject::Ingress(_) => Kind::Ingress,
            TrackedObject::IngressClass(_) => Kind::IngressClass,
            TrackedObject::Domain(_) => Kind::Domain,
            TrackedObject::HTTPSEdge(_) => Kind::HTTPSEdge,
            TrackedObject::Tunnel(_) => Kind::Tunnel,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            TrackedObject::Ingress(o) => &o.metadata,
            TrackedObject::IngressClass(o) => &o.metadata,
            TrackedObject::Domain(o) => &o.metadata,
            TrackedObject::HTTPSEdge(o) => &o.metadata,
            TrackedObject::Tunnel(o) => &o.metadata,
        }
    }

    pub fn key(&self) -> ObjectKey {
        let meta = self.metadata();
        ObjectKey::new(
            self.kind(),
            meta.namespace.clone().unwrap_or_default(),
            meta.name.clone().unwrap_or_default(),
        )
    }
}

/// Thread-safe store of tracked objects
///
/// Last write wins per key; writes to different keys are unordered.
#[derive(Debug, Default)]
pub struct ResourceStore {
    objects: RwLock<HashMap<ObjectKey, TrackedObject>>,
    seeded: AtomicBool,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ObjectKey, TrackedObject>> {
        self.objects.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ObjectKey, TrackedObject>> {
        self.objects.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts or replaces the object under its key.
    pub fn update(&self, obj: TrackedObject) {
        let key = obj.key();
        debug!("Store update: {}", key);
        self.write().insert(key, obj);
    }

    /// Typed form of [`update`](Self::update)
    pub fn update_resource<K: Managed>(&self, obj: K) {
        self.update(obj.into_tracked());
    }

    /// Removes the object under `key`. Absent keys are a no-op.
    pub fn delete(&self, key: &ObjectKey) {
        if self.write().remove(key).is_some() {
            debug!("Store delete: {}", key);
        }
    }

    /// Copy of the object under `key`
    pub fn get(&self, key: &ObjectKey) -> Option<TrackedObject> {
        self.read().get(key).cloned()
    }

    /// Typed point lookup
    pub fn get_as<K: Managed>(&self, namespace: &str, name: &str) -> Option<K> {
        self.get(&ObjectKey::new(K::KIND, namespace, name))
            .and_then(K::from_tracked)
    }

    /// Snapshot of every object of `kind`, in no particular order
    pub fn list(&self, kind: Kind) -> Vec<TrackedObject> {
        self.read()
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .map(|(_, obj)| obj.clone())
            .collect()
    }

    /// Typed snapshot of every object of kind `K`
    pub fn list_as<K: Managed>(&self) -> Vec<K> {
        self.list(K::KIND)
            .into_iter()
            .filter_map(K::from_tracked)
            .collect()
    }

    /// Drops every object of `kind` whose key is not in `keep`; returns how many were dropped.
    ///
    /// Used after a watch relist, which does not report objects deleted
    /// while the watch was down.
    pub fn retain_kind(&self, kind: Kind, keep: &HashSet<ObjectKey>) -> usize {
        let mut objects = self.write();
        let before = objects.len();
        objects.retain(|key, _| key.kind != kind || keep.contains(key));
        before - objects.len()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Whether [`seed`](Self::seed) has completed successfully
    pub fn is_seeded(&self) -> bool {
        self.seeded.load(Ordering::Acquire)
    }

    /// Loads every object of every tracked kind from `client`.
    ///
    /// All lists must succeed before anything is inserted. On failure the
    /// store is left empty and unseeded.
    pub async fn seed<C: ClusterApi>(&self, client: &C) -> Result<usize, ClientError> {
        match list_all(client).await {
            Ok(objects) => {
                let count = objects.len();
                {
                    let mut store = self.write();
                    store.clear();
                    for obj in objects {
                        store.insert(obj.key(), obj);
                    }
                }
                self.seeded.store(true, Ordering::Release);
                info!("Store seeded with {} object(s)", count);
                Ok(count)
            }
            Err(e) => {
                self.write().clear();
                self.seeded.store(false, Ordering::Release);
                error!("Failed to seed store: {}", e);
                Err(e)
            }
        }
    }
}

async fn list_all<C: ClusterApi>(client: &C) -> Result<Vec<TrackedObject>, ClientError> {
    let mut objects = Vec::new();
    objects.extend(client.list::<IngressClass>().await?.into_iter().map(Managed::into_tracked));
    objects.extend(client.list::<Ingress>().await?.into_iter().map(Managed::into_tracked));
    objects.extend(client.list::<Domain>().await?.into_iter().map(Managed::into_tracked));
    objects.extend(client.list::<HTTPSEdge>().await?.into_iter().map(Managed::into_tracked));
    objects.extend(client.list::<Tunnel>().await?.into_iter().map(Managed::into_tracked));
    Ok(objects)
}
