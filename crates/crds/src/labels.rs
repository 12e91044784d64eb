//! Label keys and backend references shared by edges and tunnels
//!
//! An edge route never names a tunnel directly. It carries a label set, and
//! the provider routes traffic to whichever tunnel was opened with the same
//! labels. Both sides therefore build their labels through [`backend_labels`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label holding the namespace of the backend service
pub const NAMESPACE_LABEL: &str = "k8s.ngrok.com/namespace";

/// Label holding the name of the backend service
pub const SERVICE_LABEL: &str = "k8s.ngrok.com/service";

/// Label holding the backend service port number
pub const PORT_LABEL: &str = "k8s.ngrok.com/port";

/// Label placed on every derived object so live objects can be told apart
/// from ones created by users or other controllers
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Builds the label set that identifies a `(namespace, service, port)` backend.
pub fn backend_labels(namespace: &str, service: &str, port: i32) -> BTreeMap<String, String> {
    BTreeMap::from([
        (NAMESPACE_LABEL.to_string(), namespace.to_string()),
        (SERVICE_LABEL.to_string(), service.to_string()),
        (PORT_LABEL.to_string(), port.to_string()),
    ])
}

/// Reference from an edge route to the group of tunnels carrying these labels
///
/// Follows the provider's tunnel-group backend model: any tunnel whose labels
/// are a superset of `labels` receives traffic for the route.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TunnelGroupBackend {
    /// Labels a tunnel must carry to receive traffic for this route
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl TunnelGroupBackend {
    /// Create a backend reference for a service port
    pub fn for_service(namespace: &str, service: &str, port: i32) -> Self {
        Self {
            labels: backend_labels(namespace, service, port),
        }
    }
}
