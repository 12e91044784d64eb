//! Controller configuration from environment variables.
//!
//! Empty variables are treated as unset, except `CONTROLLER_NAME`, which
//! must not be empty when given.

use crate::error::ControllerError;
use crate::reconciler::ReconcilerSettings;
use crds::DEFAULT_CLUSTER_DOMAIN;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CONTROLLER_NAME: &str = "k8s.ngrok.com/ingress-controller";
const DEFAULT_MANAGER_NAME: &str = "ngrok-ingress-controller";
const DEFAULT_CA_CERTS_DIR: &str = "/etc/ssl/certs/ngrok/";
const DEFAULT_SYNC_DEBOUNCE_SECS: u64 = 2;
const DEFAULT_PROBE_ADDR: &str = "0.0.0.0:8081";

/// Runtime configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Matched against `IngressClass.spec.controller`
    pub controller_name: String,
    /// Value of the managed-by label on derived objects
    pub manager_name: String,
    /// Namespace to watch; all namespaces when `None`
    pub watch_namespace: Option<String>,
    /// DNS suffix of in-cluster services
    pub cluster_domain: String,
    /// Provider server address override
    pub server_addr: Option<String>,
    /// Provider credential
    pub authtoken: Option<String>,
    /// Extra trust roots for the provider session
    pub ca_certs_dir: PathBuf,
    /// Quiet period after the last change before a sync
    pub sync_debounce: Duration,
    /// Bind address of the probe server
    pub probe_addr: SocketAddr,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let controller_name = match lookup("CONTROLLER_NAME") {
            Some(name) if name.trim().is_empty() => {
                return Err(ControllerError::InvalidConfig(
                    "CONTROLLER_NAME must not be empty".to_string(),
                ));
            }
            Some(name) => name.trim().to_string(),
            None => DEFAULT_CONTROLLER_NAME.to_string(),
        };

        let sync_debounce_secs = match var("SYNC_DEBOUNCE_SECS") {
            Some(value) => value.trim().parse::<u64>().map_err(|e| {
                ControllerError::InvalidConfig(format!("SYNC_DEBOUNCE_SECS={:?}: {}", value, e))
            })?,
            None => DEFAULT_SYNC_DEBOUNCE_SECS,
        };

        let probe_addr = var("PROBE_ADDR").unwrap_or_else(|| DEFAULT_PROBE_ADDR.to_string());
        let probe_addr = probe_addr.trim().parse::<SocketAddr>().map_err(|e| {
            ControllerError::InvalidConfig(format!("PROBE_ADDR={:?}: {}", probe_addr, e))
        })?;

        Ok(Self {
            controller_name,
            manager_name: var("MANAGER_NAME").unwrap_or_else(|| DEFAULT_MANAGER_NAME.to_string()),
            watch_namespace: var("WATCH_NAMESPACE"),
            cluster_domain: var("CLUSTER_DOMAIN").unwrap_or_else(|| DEFAULT_CLUSTER_DOMAIN.to_string()),
            server_addr: var("NGROK_SERVER_ADDR"),
            authtoken: var("NGROK_AUTHTOKEN"),
            ca_certs_dir: PathBuf::from(var("NGROK_CA_CERTS_DIR").unwrap_or_else(|| DEFAULT_CA_CERTS_DIR.to_string())),
            sync_debounce: Duration::from_secs(sync_debounce_secs),
            probe_addr,
        })
    }

    /// Settings handed to the reconciler
    pub fn reconciler_settings(&self) -> ReconcilerSettings {
        ReconcilerSettings {
            controller_name: self.controller_name.clone(),
            manager_name: self.manager_name.clone(),
            cluster_domain: self.cluster_domain.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ControllerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.controller_name, "k8s.ngrok.com/ingress-controller");
        assert_eq!(config.manager_name, "ngrok-ingress-controller");
        assert_eq!(config.watch_namespace, None);
        assert_eq!(config.cluster_domain, "svc.cluster.local");
        assert_eq!(config.server_addr, None);
        assert_eq!(config.authtoken, None);
        assert_eq!(config.ca_certs_dir, PathBuf::from("/etc/ssl/certs/ngrok/"));
        assert_eq!(config.sync_debounce, Duration::from_secs(2));
        assert_eq!(config.probe_addr, "0.0.0.0:8081".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("CONTROLLER_NAME", "example.com/ingress"),
            ("MANAGER_NAME", "my-manager"),
            ("WATCH_NAMESPACE", "shop"),
            ("CLUSTER_DOMAIN", "svc.example.internal"),
            ("NGROK_SERVER_ADDR", "tunnel.example.com:443"),
            ("NGROK_AUTHTOKEN", "secret"),
            ("NGROK_CA_CERTS_DIR", "/tmp/certs"),
            ("SYNC_DEBOUNCE_SECS", "0"),
            ("PROBE_ADDR", "127.0.0.1:9000"),
        ])
        .unwrap();

        assert_eq!(config.controller_name, "example.com/ingress");
        assert_eq!(config.watch_namespace.as_deref(), Some("shop"));
        assert_eq!(config.server_addr.as_deref(), Some("tunnel.example.com:443"));
        assert_eq!(config.authtoken.as_deref(), Some("secret"));
        assert_eq!(config.ca_certs_dir, PathBuf::from("/tmp/certs"));
        assert_eq!(config.sync_debounce, Duration::ZERO);
        assert_eq!(config.probe_addr.port(), 9000);

        let settings = config.reconciler_settings();
        assert_eq!(settings.manager_name, "my-manager");
        assert_eq!(settings.cluster_domain, "svc.example.internal");
    }

    #[test]
    fn test_empty_values_fall_back_to_defaults() {
        let config = config(&[("WATCH_NAMESPACE", ""), ("MANAGER_NAME", "  ")]).unwrap();
        assert_eq!(config.watch_namespace, None);
        assert_eq!(config.manager_name, "ngrok-ingress-controller");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for vars in [
            vec![("CONTROLLER_NAME", " ")],
            vec![("SYNC_DEBOUNCE_SECS", "soon")],
            vec![("SYNC_DEBOUNCE_SECS", "-1")],
            vec![("PROBE_ADDR", "localhost")],
        ] {
            let err = config(&vars).unwrap_err();
            assert!(matches!(err, ControllerError::InvalidConfig(_)), "{:?}", vars);
        }
    }
}
