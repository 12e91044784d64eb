//! Ingress ownership resolution.
//!
//! Decides, from the current IngressClass set alone, whether this controller
//! owns an Ingress. Nothing is cached: class objects change independently
//! of Ingresses, so the answer is recomputed on every call.
//!
//! Rules:
//! - An Ingress naming a class is owned iff a class with that name exists
//!   and its controller is ours.
//! - An Ingress naming no class is owned iff exactly one of *our* classes is
//!   marked default. Zero or several defaults mean "not ours". Classes of
//!   other controllers never count.

use crate::store::ResourceStore;
use k8s_openapi::api::networking::v1::{Ingress, IngressClass};
use kube::ResourceExt;

/// Annotation marking an IngressClass as the cluster default
pub const DEFAULT_CLASS_ANNOTATION: &str = "ingressclass.kubernetes.io/is-default-class";

/// Legacy annotation naming an Ingress's class
pub const LEGACY_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

/// Class name an Ingress asks for, if any.
///
/// `spec.ingressClassName` wins over the legacy annotation.
pub fn requested_class(ingress: &Ingress) -> Option<&str> {
    ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.ingress_class_name.as_deref())
        .or_else(|| ingress.annotations().get(LEGACY_CLASS_ANNOTATION).map(String::as_str))
        .filter(|name| !name.is_empty())
}

/// Whether `class` is marked as the default class
pub fn is_default_class(class: &IngressClass) -> bool {
    class
        .annotations()
        .get(DEFAULT_CLASS_ANNOTATION)
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Whether `class` belongs to `controller`
pub fn is_our_class(class: &IngressClass, controller: &str) -> bool {
    class
        .spec
        .as_ref()
        .and_then(|spec| spec.controller.as_deref())
        == Some(controller)
}

/// Whether `controller` owns `ingress` given the cluster's `classes`
pub fn is_owned(classes: &[IngressClass], ingress: &Ingress, controller: &str) -> bool {
    match requested_class(ingress) {
        Some(name) => classes
            .iter()
            .any(|class| class.name_any() == name && is_our_class(class, controller)),
        None => {
            classes
                .iter()
                .filter(|class| is_our_class(class, controller) && is_default_class(class))
                .count()
                == 1
        }
    }
}

/// Every Ingress in `store` owned by `controller`, ordered by namespace then name
pub fn owned_ingresses(store: &ResourceStore, controller: &str) -> Vec<Ingress> {
    let classes = store.list_as::<IngressClass>();
    let mut owned: Vec<Ingress> = store
        .list_as::<Ingress>()
        .into_iter()
        .filter(|ingress| is_owned(&classes, ingress, controller))
        .collect();
    owned.sort_by(|a, b| {
        (a.namespace(), a.name_any()).cmp(&(b.namespace(), b.name_any()))
    });
    owned
}
