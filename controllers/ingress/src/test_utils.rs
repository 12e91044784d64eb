//! Test utilities for unit testing the store, resolver and reconciler
//!
//! This module provides helpers for creating test objects.

use crate::ingress_class::DEFAULT_CLASS_ANNOTATION;
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressClass,
    IngressClassSpec, IngressRule, IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// Controller name used throughout the tests
pub const TEST_CONTROLLER: &str = "k8s.ngrok.com/ingress-controller";

/// Manager name used throughout the tests
pub const TEST_MANAGER: &str = "ngrok-ingress-controller";

/// One path of a test rule: (path, service, port)
pub type TestPath<'a> = (&'a str, &'a str, i32);

/// Helper to create a test IngressClass
pub fn test_ingress_class(name: &str, controller: &str, is_default: bool) -> IngressClass {
    let annotations = is_default.then(|| {
        BTreeMap::from([(DEFAULT_CLASS_ANNOTATION.to_string(), "true".to_string())])
    });
    IngressClass {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            annotations,
            ..Default::default()
        },
        spec: Some(IngressClassSpec {
            controller: Some(controller.to_string()),
            parameters: None,
        }),
    }
}

/// Helper to create a test service backend
pub fn test_backend(service: &str, port: i32) -> IngressBackend {
    IngressBackend {
        service: Some(IngressServiceBackend {
            name: service.to_string(),
            port: Some(ServiceBackendPort {
                number: Some(port),
                name: None,
            }),
        }),
        resource: None,
    }
}

/// Helper to create a test rule for `host`
pub fn test_rule(host: &str, paths: &[TestPath<'_>]) -> IngressRule {
    IngressRule {
        host: Some(host.to_string()),
        http: Some(HTTPIngressRuleValue {
            paths: paths
                .iter()
                .map(|(path, service, port)| HTTPIngressPath {
                    path: Some((*path).to_string()),
                    path_type: "Prefix".to_string(),
                    backend: test_backend(service, *port),
                })
                .collect(),
        }),
    }
}

/// Helper to create a test Ingress
pub fn test_ingress(
    namespace: &str,
    name: &str,
    class: Option<&str>,
    rules: Vec<IngressRule>,
) -> Ingress {
    Ingress {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            ingress_class_name: class.map(str::to_string),
            rules: Some(rules),
            ..Default::default()
        }),
        status: None,
    }
}

/// Helper to create an Ingress routing `host` to `service:port` at `/`
pub fn simple_ingress(namespace: &str, name: &str, class: Option<&str>, host: &str, service: &str, port: i32) -> Ingress {
    test_ingress(namespace, name, class, vec![test_rule(host, &[("/", service, port)])])
}

/// Sets an annotation on an Ingress
pub fn annotate(mut ingress: Ingress, key: &str, value: &str) -> Ingress {
    ingress
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.to_string());
    ingress
}
