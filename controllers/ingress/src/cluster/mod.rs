//! Cluster API access.
//!
//! The store's seed and the reconciler's writes go through [`ClusterApi`]
//! so they can run against the real API server ([`KubeClusterApi`]) or the
//! in-memory mock used in tests.

mod kube_api;
#[cfg(test)]
pub mod mock;

pub use kube_api::KubeClusterApi;

use crate::error::ClientError;
use crate::store::{Kind, TrackedObject};
use crds::{Domain, HTTPSEdge, Tunnel};
use k8s_openapi::api::networking::v1::{Ingress, IngressClass};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// A resource kind the controller tracks
pub trait Managed:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Store kind of this resource
    const KIND: Kind;

    /// Wraps the resource for the store
    fn into_tracked(self) -> TrackedObject;

    /// Unwraps a stored object of this kind
    fn from_tracked(obj: TrackedObject) -> Option<Self>;

    /// API handle scoped to `namespace`, or to all namespaces when `None`.
    /// Cluster-scoped kinds ignore `namespace`.
    fn api(client: &Client, namespace: Option<&str>) -> Api<Self>;
}

macro_rules! namespaced_managed {
    ($ty:ty, $variant:ident) => {
        impl Managed for $ty {
            const KIND: Kind = Kind::$variant;

            fn into_tracked(self) -> TrackedObject {
                TrackedObject::$variant(self)
            }

            fn from_tracked(obj: TrackedObject) -> Option<Self> {
                match obj {
                    TrackedObject::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn api(client: &Client, namespace: Option<&str>) -> Api<Self> {
                match namespace {
                    Some(ns) => Api::namespaced(client.clone(), ns),
                    None => Api::all(client.clone()),
                }
            }
        }
    };
}

namespaced_managed!(Ingress, Ingress);
namespaced_managed!(Domain, Domain);
namespaced_managed!(HTTPSEdge, HTTPSEdge);
namespaced_managed!(Tunnel, Tunnel);

impl Managed for IngressClass {
    const KIND: Kind = Kind::IngressClass;

    fn into_tracked(self) -> TrackedObject {
        TrackedObject::IngressClass(self)
    }

    fn from_tracked(obj: TrackedObject) -> Option<Self> {
        match obj {
            TrackedObject::IngressClass(inner) => Some(inner),
            _ => None,
        }
    }

    fn api(client: &Client, _namespace: Option<&str>) -> Api<Self> {
        Api::all(client.clone())
    }
}

/// Typed CRUD against the cluster
///
/// Writes carry the object's resource version; a stale version fails with
/// [`ClientError::Conflict`].
#[async_trait::async_trait]
pub trait ClusterApi: Send + Sync {
    /// Lists every object of kind `K` in scope
    async fn list<K: Managed>(&self) -> Result<Vec<K>, ClientError>;

    /// Reads one object
    async fn get<K: Managed>(&self, namespace: &str, name: &str) -> Result<K, ClientError>;

    /// Creates an object; fails with `Conflict` if it already exists
    async fn create<K: Managed>(&self, obj: &K) -> Result<K, ClientError>;

    /// Replaces an object, checking its resource version
    async fn replace<K: Managed>(&self, obj: &K) -> Result<K, ClientError>;

    /// Deletes an object
    async fn delete<K: Managed>(&self, namespace: &str, name: &str) -> Result<(), ClientError>;
}
