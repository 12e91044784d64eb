//! HTTPSEdge CRD
//!
//! Describes how HTTPS traffic arriving at a domain is routed to tunnel
//! groups. One edge exists per Ingress host.

use crate::labels::TunnelGroupBackend;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Match type for a route whose path is a prefix
pub const MATCH_TYPE_PATH_PREFIX: &str = "path_prefix";

/// Match type for a route whose path must match exactly
pub const MATCH_TYPE_EXACT_PATH: &str = "exact_path";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[kube(
    group = "ingress.k8s.ngrok.com",
    version = "v1alpha1",
    kind = "HTTPSEdge",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct HTTPSEdgeSpec {
    /// Host and port pairs this edge listens on (e.g., "app.example.com:443")
    #[serde(default)]
    pub hostports: Vec<String>,

    /// Ordered routes; the provider evaluates them in order
    #[serde(default)]
    pub routes: Vec<HTTPSEdgeRouteSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HTTPSEdgeRouteSpec {
    /// Path to match (e.g., "/", "/api")
    #[serde(rename = "match")]
    pub match_: String,

    /// How `match` is compared ("path_prefix" or "exact_path")
    pub match_type: String,

    /// Tunnel group receiving traffic for this route
    pub backend: TunnelGroupBackend,

    /// TLS termination settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_termination: Option<EndpointTLSTerminationAtEdge>,

    /// Response compression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<EndpointCompression>,

    /// IP policies restricting who may reach this route
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_restriction: Option<EndpointIPPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EndpointTLSTerminationAtEdge {
    /// Minimum TLS version accepted from clients (e.g., "1.2", "1.3")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub min_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EndpointCompression {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EndpointIPPolicy {
    #[serde(default)]
    pub ip_policy_ids: Vec<String>,
}
