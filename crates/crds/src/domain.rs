//! Domain CRD
//!
//! Records a public hostname claimed for an Ingress host.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[kube(
    group = "ingress.k8s.ngrok.com",
    version = "v1alpha1",
    kind = "Domain",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct DomainSpec {
    /// The hostname to reserve (e.g., "app.example.com")
    pub domain: String,
}

/// Object name used for the Domain of `host`.
///
/// Dots are not valid in every position of a Kubernetes name, so
/// `app.example.com` becomes `app-example-com`.
pub fn domain_object_name(host: &str) -> String {
    host.replace('.', "-")
}
