//! Route and backend options read from Ingress annotations.
//!
//! Only the handful of options the edge routes and tunnels carry are
//! extracted. Malformed values are logged and ignored.

use crds::{EndpointCompression, EndpointIPPolicy, EndpointTLSTerminationAtEdge};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use tracing::warn;

/// Enables or disables response compression ("true"/"false")
pub const COMPRESSION_ANNOTATION: &str = "k8s.ngrok.com/https-compression";

/// Comma-separated IP policy ids restricting access
pub const IP_POLICY_IDS_ANNOTATION: &str = "k8s.ngrok.com/ip-policy-ids";

/// Minimum TLS version accepted at the edge
pub const TLS_MIN_VERSION_ANNOTATION: &str = "k8s.ngrok.com/tls-min-version";

/// Protocol spoken by every backend of the Ingress ("tcp" or "tls")
pub const BACKEND_PROTOCOL_ANNOTATION: &str = "k8s.ngrok.com/backend-protocol";

const TLS_VERSIONS: [&str; 4] = ["1.0", "1.1", "1.2", "1.3"];

const BACKEND_PROTOCOLS: [&str; 2] = ["tcp", "tls"];

/// Options applied to every route derived from one Ingress
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteOptions {
    pub compression: Option<EndpointCompression>,
    pub ip_restriction: Option<EndpointIPPolicy>,
    pub tls_termination: Option<EndpointTLSTerminationAtEdge>,
}

/// Reads the route options annotated on `ingress`.
pub fn route_options(ingress: &Ingress) -> RouteOptions {
    let annotations = ingress.annotations();
    let name = ingress.name_any();
    let mut options = RouteOptions::default();

    if let Some(value) = annotations.get(COMPRESSION_ANNOTATION) {
        match value.trim().parse::<bool>() {
            Ok(enabled) => options.compression = Some(EndpointCompression { enabled }),
            Err(_) => warn!("Ingress {}: ignoring {}={:?}, expected true or false", name, COMPRESSION_ANNOTATION, value),
        }
    }

    if let Some(value) = annotations.get(IP_POLICY_IDS_ANNOTATION) {
        let ids: Vec<String> = value
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        if ids.is_empty() {
            warn!("Ingress {}: ignoring empty {}", name, IP_POLICY_IDS_ANNOTATION);
        } else {
            options.ip_restriction = Some(EndpointIPPolicy { ip_policy_ids: ids });
        }
    }

    if let Some(value) = annotations.get(TLS_MIN_VERSION_ANNOTATION) {
        let version = value.trim();
        if TLS_VERSIONS.contains(&version) {
            options.tls_termination = Some(EndpointTLSTerminationAtEdge {
                min_version: version.to_string(),
            });
        } else {
            warn!("Ingress {}: ignoring {}={:?}, expected one of {:?}", name, TLS_MIN_VERSION_ANNOTATION, value, TLS_VERSIONS);
        }
    }

    options
}

/// Backend protocol annotated on `ingress`, lowercased.
///
/// `None` when unset or not one of "tcp"/"tls".
pub fn backend_protocol(ingress: &Ingress) -> Option<String> {
    let value = ingress.annotations().get(BACKEND_PROTOCOL_ANNOTATION)?;
    let protocol = value.trim().to_ascii_lowercase();
    if BACKEND_PROTOCOLS.contains(&protocol.as_str()) {
        Some(protocol)
    } else {
        warn!(
            "Ingress {}: ignoring {}={:?}, expected one of {:?}",
            ingress.name_any(),
            BACKEND_PROTOCOL_ANNOTATION,
            value,
            BACKEND_PROTOCOLS
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{annotate, simple_ingress};

    #[test]
    fn test_no_annotations() {
        let ingress = simple_ingress("ns", "web", None, "example.com", "web", 80);
        assert_eq!(route_options(&ingress), RouteOptions::default());
    }

    #[test]
    fn test_all_annotations() {
        let ingress = simple_ingress("ns", "web", None, "example.com", "web", 80);
        let ingress = annotate(ingress, COMPRESSION_ANNOTATION, "true");
        let ingress = annotate(ingress, IP_POLICY_IDS_ANNOTATION, "policy-1, policy-2,");
        let ingress = annotate(ingress, TLS_MIN_VERSION_ANNOTATION, "1.3");

        let options = route_options(&ingress);
        assert_eq!(options.compression, Some(EndpointCompression { enabled: true }));
        assert_eq!(
            options.ip_restriction,
            Some(EndpointIPPolicy {
                ip_policy_ids: vec!["policy-1".to_string(), "policy-2".to_string()]
            })
        );
        assert_eq!(options.tls_termination.map(|t| t.min_version), Some("1.3".to_string()));
    }

    #[test]
    fn test_compression_false_is_kept() {
        let ingress = annotate(
            simple_ingress("ns", "web", None, "example.com", "web", 80),
            COMPRESSION_ANNOTATION,
            "false",
        );
        assert_eq!(route_options(&ingress).compression, Some(EndpointCompression { enabled: false }));
    }

    #[test]
    fn test_malformed_values_are_ignored() {
        let ingress = simple_ingress("ns", "web", None, "example.com", "web", 80);
        let ingress = annotate(ingress, COMPRESSION_ANNOTATION, "yes please");
        let ingress = annotate(ingress, IP_POLICY_IDS_ANNOTATION, " , ");
        let ingress = annotate(ingress, TLS_MIN_VERSION_ANNOTATION, "tls1.3");

        assert_eq!(route_options(&ingress), RouteOptions::default());
    }

    #[test]
    fn test_backend_protocol() {
        let plain = simple_ingress("ns", "web", None, "example.com", "web", 8443);
        assert_eq!(backend_protocol(&plain), None);

        let tls = annotate(plain.clone(), BACKEND_PROTOCOL_ANNOTATION, " TLS ");
        assert_eq!(backend_protocol(&tls).as_deref(), Some("tls"));

        let bogus = annotate(plain, BACKEND_PROTOCOL_ANNOTATION, "h2c");
        assert_eq!(backend_protocol(&bogus), None);
    }
}
