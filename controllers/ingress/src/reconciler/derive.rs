//! Desired state derived from owned Ingresses.
//!
//! One Domain and one HTTPSEdge per distinct host, one Tunnel per distinct
//! `(namespace, service, port)` backend. Identities are derived from the
//! host and the backend only, never from the Ingress, so Ingresses sharing
//! a host or a backend merge into the same objects. A backend's protocol
//! comes from the first Ingress (in order) that routes to it.

use super::ReconcilerSettings;
use crate::annotations::{RouteOptions, backend_protocol, route_options};
use crds::{
    Domain, DomainSpec, HTTPSEdge, HTTPSEdgeRouteSpec, HTTPSEdgeSpec, MANAGED_BY_LABEL,
    MATCH_TYPE_EXACT_PATH, MATCH_TYPE_PATH_PREFIX, Tunnel, TunnelGroupBackend, TunnelSpec,
    domain_object_name, tunnel_object_name,
};
use k8s_openapi::api::networking::v1::{HTTPIngressPath, Ingress, IngressBackend};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// `(namespace, name)` of a derived object
pub type ObjectRef = (String, String);

/// Everything the controller wants to exist after a pass
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DesiredState {
    pub domains: BTreeMap<ObjectRef, Domain>,
    pub edges: BTreeMap<ObjectRef, HTTPSEdge>,
    pub tunnels: BTreeMap<ObjectRef, Tunnel>,
}

/// A usable `service:port` backend
struct ServicePort<'a> {
    service: &'a str,
    port: i32,
}

fn service_port<'a>(ingress: &Ingress, backend: &'a IngressBackend) -> Option<ServicePort<'a>> {
    let Some(service) = backend.service.as_ref() else {
        warn!("Ingress {}: skipping non-service backend", ingress.name_any());
        return None;
    };
    match service.port.as_ref().and_then(|p| p.number) {
        Some(port) => Some(ServicePort {
            service: &service.name,
            port,
        }),
        None => {
            warn!(
                "Ingress {}: skipping backend {} without a numeric port",
                ingress.name_any(),
                service.name
            );
            None
        }
    }
}

fn match_type(path: &HTTPIngressPath) -> &'static str {
    if path.path_type == "Exact" {
        MATCH_TYPE_EXACT_PATH
    } else {
        MATCH_TYPE_PATH_PREFIX
    }
}

fn managed_meta(namespace: &str, name: &str, settings: &ReconcilerSettings) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(BTreeMap::from([(
            MANAGED_BY_LABEL.to_string(),
            settings.manager_name.clone(),
        )])),
        ..Default::default()
    }
}

fn route(path: &HTTPIngressPath, backend: TunnelGroupBackend, options: &RouteOptions) -> HTTPSEdgeRouteSpec {
    HTTPSEdgeRouteSpec {
        match_: path
            .path
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or("/")
            .to_string(),
        match_type: match_type(path).to_string(),
        backend,
        tls_termination: options.tls_termination.clone(),
        compression: options.compression.clone(),
        ip_restriction: options.ip_restriction.clone(),
    }
}

/// Computes the desired Domains, HTTPSEdges and Tunnels for `ingresses`.
///
/// `ingresses` should already be ordered by namespace then name; routes of
/// a shared edge are merged in that order. A route repeating an earlier
/// `match` + `matchType` on the same edge is dropped.
pub fn desired_state(ingresses: &[Ingress], settings: &ReconcilerSettings) -> DesiredState {
    let mut desired = DesiredState::default();

    for ingress in ingresses {
        let namespace = ingress.namespace().unwrap_or_else(|| "default".to_string());
        let ingress_name = ingress.name_any();
        let options = route_options(ingress);
        let protocol = backend_protocol(ingress);
        let rules = ingress
            .spec
            .as_ref()
            .and_then(|spec| spec.rules.as_deref())
            .unwrap_or_default();

        for rule in rules {
            let Some(host) = rule.host.as_deref().filter(|h| !h.is_empty()) else {
                warn!("Ingress {}/{}: skipping rule without a host", namespace, ingress_name);
                continue;
            };

            let mut routes = Vec::new();
            let paths = rule.http.as_ref().map(|http| http.paths.as_slice()).unwrap_or_default();
            for path in paths {
                let Some(backend) = service_port(ingress, &path.backend) else {
                    continue;
                };
                routes.push((
                    route(path, TunnelGroupBackend::for_service(&namespace, backend.service, backend.port), &options),
                    backend,
                ));
            }
            if routes.is_empty() {
                warn!("Ingress {}/{}: host {} has no usable backends", namespace, ingress_name, host);
                continue;
            }

            let object_name = domain_object_name(host);
            let key = (namespace.clone(), object_name.clone());

            let domain = desired.domains.entry(key.clone()).or_insert_with(|| Domain {
                metadata: managed_meta(&namespace, &object_name, settings),
                spec: DomainSpec {
                    domain: host.to_string(),
                },
            });
            if domain.spec.domain != host {
                warn!(
                    "Ingress {}/{}: host {} maps to {} which is already used by {}; skipping",
                    namespace, ingress_name, host, object_name, domain.spec.domain
                );
                continue;
            }

            let edge = desired.edges.entry(key).or_insert_with(|| HTTPSEdge {
                metadata: managed_meta(&namespace, &object_name, settings),
                spec: HTTPSEdgeSpec {
                    hostports: vec![format!("{host}:443")],
                    routes: Vec::new(),
                },
            });

            for (route, backend) in routes {
                let duplicate = edge
                    .spec
                    .routes
                    .iter()
                    .any(|r| r.match_ == route.match_ && r.match_type == route.match_type);
                if duplicate {
                    warn!(
                        "Ingress {}/{}: dropping duplicate route {} ({}) on host {}",
                        namespace, ingress_name, route.match_, route.match_type, host
                    );
                    continue;
                }
                edge.spec.routes.push(route);

                let tunnel_name = tunnel_object_name(backend.service, backend.port);
                let tunnel = desired
                    .tunnels
                    .entry((namespace.clone(), tunnel_name.clone()))
                    .or_insert_with(|| Tunnel {
                        metadata: managed_meta(&namespace, &tunnel_name, settings),
                        spec: TunnelSpec::for_service(
                            &namespace,
                            backend.service,
                            backend.port,
                            &settings.cluster_domain,
                        )
                        .with_protocol(protocol.as_deref()),
                    });
                let wanted = protocol.as_deref().unwrap_or("tcp");
                if tunnel.spec.protocol() != wanted {
                    warn!(
                        "Ingress {}/{}: backend {} already uses protocol {}, ignoring {}",
                        namespace,
                        ingress_name,
                        tunnel_name,
                        tunnel.spec.protocol(),
                        wanted
                    );
                }
            }
        }
    }

    debug!(
        "Desired state: {} domain(s), {} edge(s), {} tunnel(s)",
        desired.domains.len(),
        desired.edges.len(),
        desired.tunnels.len()
    );
    desired
}
