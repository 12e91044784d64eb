//! [`ClusterApi`] backed by a `kube::Client`

use super::{ClusterApi, Managed};
use crate::error::ClientError;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

/// Cluster access through the Kubernetes API server
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
    namespace: Option<String>,
}

impl KubeClusterApi {
    /// Creates an API scoped to `namespace` (all namespaces when `None`).
    pub fn new(client: Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }
}

fn map_error<K: Managed>(namespace: &str, name: &str, err: kube::Error) -> ClientError {
    match err {
        kube::Error::Api(ae) if ae.code == 409 => ClientError::Conflict {
            kind: K::KIND,
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(ae) if ae.code == 404 => ClientError::NotFound {
            kind: K::KIND,
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(ae) => ClientError::Api {
            code: ae.code,
            message: ae.message.clone(),
        },
        other => ClientError::Kube(other),
    }
}

#[async_trait::async_trait]
impl ClusterApi for KubeClusterApi {
    async fn list<K: Managed>(&self) -> Result<Vec<K>, ClientError> {
        let api = K::api(&self.client, self.namespace.as_deref());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| map_error::<K>("", "", e))?;
        debug!("Listed {} {} object(s)", list.items.len(), K::KIND);
        Ok(list.items)
    }

    async fn get<K: Managed>(&self, namespace: &str, name: &str) -> Result<K, ClientError> {
        K::api(&self.client, Some(namespace))
            .get(name)
            .await
            .map_err(|e| map_error::<K>(namespace, name, e))
    }

    async fn create<K: Managed>(&self, obj: &K) -> Result<K, ClientError> {
        let namespace = obj.namespace().unwrap_or_default();
        let name = obj.name_any();
        K::api(&self.client, Some(&namespace))
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| map_error::<K>(&namespace, &name, e))
    }

    async fn replace<K: Managed>(&self, obj: &K) -> Result<K, ClientError> {
        let namespace = obj.namespace().unwrap_or_default();
        let name = obj.name_any();
        K::api(&self.client, Some(&namespace))
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| map_error::<K>(&namespace, &name, e))
    }

    async fn delete<K: Managed>(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        K::api(&self.client, Some(namespace))
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| map_error::<K>(namespace, name, e))?;
        Ok(())
    }
}
