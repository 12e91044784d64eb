//! Controller-specific error types.
//!
//! - `ControllerError`: fatal start-up and runtime failures
//! - `ClientError`: one failed cluster API call
//! - `SyncError`: every per-object failure of one reconciliation pass

use crate::store::Kind;
use std::fmt;
use thiserror::Error;
use tunnel_driver::TunnelError;

/// Errors that stop the Ingress Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes client could not be created
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Initial load of the store failed
    #[error("Failed to seed store: {0}")]
    Seed(#[source] ClientError),

    /// Provider session could not be established
    #[error("Tunnel session error: {0}")]
    Tunnel(#[from] TunnelError),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Health probe server failed
    #[error("Probe server failed: {0}")]
    Probe(String),
}

/// Errors from a single cluster API call.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The write was rejected because the object changed (stale
    /// resource version) or already exists
    #[error("Conflict writing {kind} {namespace}/{name}")]
    Conflict {
        kind: Kind,
        namespace: String,
        name: String,
    },

    /// The object does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: Kind,
        namespace: String,
        name: String,
    },

    /// Any other rejection by the API server
    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },

    /// Transport or client-side failure
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Object could not be converted
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether retrying with a freshly read object may succeed
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Conflict { .. })
    }

    /// Whether the object is already gone
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }
}

/// One derived object that could not be brought to its desired state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectFailure {
    pub kind: Kind,
    pub namespace: String,
    pub name: String,
    pub reason: String,
}

impl fmt::Display for ObjectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}: {}", self.kind, self.namespace, self.name, self.reason)
    }
}

/// Aggregated result of a reconciliation pass that had failures
#[derive(Debug, Error)]
pub enum SyncError {
    /// Objects that failed; everything else in the pass was applied
    #[error("{} object(s) failed to reconcile: {}", .0.len(), join_failures(.0))]
    Objects(Vec<ObjectFailure>),
}

impl SyncError {
    /// The failed objects
    pub fn failures(&self) -> &[ObjectFailure] {
        match self {
            SyncError::Objects(failures) => failures,
        }
    }
}

fn join_failures(failures: &[ObjectFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_error_lists_every_failure() {
        let err = SyncError::Objects(vec![
            ObjectFailure {
                kind: Kind::Domain,
                namespace: "web".to_string(),
                name: "example-com".to_string(),
                reason: "conflict".to_string(),
            },
            ObjectFailure {
                kind: Kind::Tunnel,
                namespace: "web".to_string(),
                name: "frontend-80".to_string(),
                reason: "quota".to_string(),
            },
        ]);
        let message = err.to_string();
        assert!(message.starts_with("2 object(s) failed"));
        assert!(message.contains("Domain web/example-com: conflict"));
        assert!(message.contains("Tunnel web/frontend-80: quota"));
        assert_eq!(err.failures().len(), 2);
    }
}
