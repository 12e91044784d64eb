//! Tunnel CRD
//!
//! A named forwarding target for one `(namespace, service, port)` backend.
//! The tunnel driver opens one live provider tunnel per Tunnel object.

use crate::labels::backend_labels;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default cluster DNS suffix for services
pub const DEFAULT_CLUSTER_DOMAIN: &str = "svc.cluster.local";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[kube(
    group = "ingress.k8s.ngrok.com",
    version = "v1alpha1",
    kind = "Tunnel",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct TunnelSpec {
    /// Address connections are forwarded to
    /// (e.g., "frontend.web.svc.cluster.local:8080")
    pub forwards_to: String,

    /// Labels the tunnel is opened with; edge routes select on these
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Backend settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<TunnelBackend>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TunnelBackend {
    /// Protocol spoken by the backend ("tcp" or "tls"); defaults to "tcp"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

impl TunnelSpec {
    /// Spec for the tunnel serving `service:port` in `namespace`.
    pub fn for_service(namespace: &str, service: &str, port: i32, cluster_domain: &str) -> Self {
        Self {
            forwards_to: format!("{service}.{namespace}.{cluster_domain}:{port}"),
            labels: backend_labels(namespace, service, port),
            backend: None,
        }
    }

    /// Sets the backend protocol. "tcp" clears it since it is the default.
    pub fn with_protocol(mut self, protocol: Option<&str>) -> Self {
        self.backend = protocol
            .filter(|p| *p != "tcp")
            .map(|p| TunnelBackend {
                protocol: Some(p.to_string()),
            });
        self
    }

    /// Backend protocol, "tcp" unless the backend says otherwise.
    pub fn protocol(&self) -> &str {
        self.backend
            .as_ref()
            .and_then(|b| b.protocol.as_deref())
            .unwrap_or("tcp")
    }
}

/// Object name used for the Tunnel of `service:port`.
pub fn tunnel_object_name(service: &str, port: i32) -> String {
    format!("{service}-{port}")
}
