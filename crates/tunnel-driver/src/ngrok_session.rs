//! ngrok-backed provider session

use crate::error::{AcceptError, TunnelError};
use crate::session::{BoxedConn, ProviderTunnel, Session, TunnelConfig, TunnelConn};
use crate::tls::load_ca_bundle;
use futures::StreamExt;
use ngrok::conn::{ConnInfo, EdgeConn};
use ngrok::tunnel::{LabeledTunnel, TunnelCloser, TunnelInfo};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{debug, info};

/// Options for connecting to ngrok
#[derive(Debug, Clone, Default)]
pub struct NgrokOptions {
    /// Auth token; falls back to `NGROK_AUTHTOKEN` when unset
    pub authtoken: Option<String>,
    /// Server address override
    pub server_addr: Option<String>,
    /// Directory of extra `*.crt` trust roots
    pub ca_certs_dir: Option<PathBuf>,
}

/// An established ngrok session
#[derive(Clone)]
pub struct NgrokSession {
    inner: ngrok::Session,
}

impl std::fmt::Debug for NgrokSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NgrokSession").finish_non_exhaustive()
    }
}

impl NgrokSession {
    /// Connects to ngrok with `options`.
    pub async fn connect(options: &NgrokOptions) -> Result<Self, TunnelError> {
        let mut builder = ngrok::Session::builder();

        match &options.authtoken {
            Some(token) => builder.authtoken(token.clone()),
            None => builder.authtoken_from_env(),
        };

        if let Some(addr) = &options.server_addr {
            builder
                .server_addr(addr.clone())
                .map_err(|e| TunnelError::Session(format!("Invalid server address {}: {}", addr, e)))?;
        }

        if let Some(dir) = &options.ca_certs_dir {
            if let Some(bundle) = load_ca_bundle(dir)? {
                info!("Loaded custom CA certificates from {:?}", dir);
                builder.ca_cert(bytes::Bytes::from(bundle));
            }
        }

        let inner = builder
            .connect()
            .await
            .map_err(|e| TunnelError::Session(e.to_string()))?;
        info!("Connected to ngrok");
        Ok(Self { inner })
    }
}

#[async_trait::async_trait]
impl Session for NgrokSession {
    async fn listen(&self, config: TunnelConfig) -> Result<Box<dyn ProviderTunnel>, TunnelError> {
        let mut builder = self.inner.labeled_tunnel();
        for (key, value) in &config.labels {
            builder.label(key.clone(), value.clone());
        }
        builder.forwards_to(config.forwards_to.clone());

        let tunnel = builder
            .listen()
            .await
            .map_err(|e| TunnelError::Listen(e.to_string()))?;
        debug!(id = %tunnel.id(), "ngrok labeled tunnel listening");

        Ok(Box::new(NgrokTunnel {
            labels: config.labels,
            inner: tunnel,
        }))
    }
}

struct NgrokTunnel {
    labels: BTreeMap<String, String>,
    inner: LabeledTunnel,
}

impl TunnelConn for EdgeConn {
    fn remote_addr(&self) -> Option<SocketAddr> {
        Some(ConnInfo::remote_addr(self))
    }
}

#[async_trait::async_trait]
impl ProviderTunnel for NgrokTunnel {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    async fn accept(&mut self) -> Result<BoxedConn, AcceptError> {
        match self.inner.next().await {
            Some(Ok(conn)) => Ok(Box::new(conn)),
            Some(Err(e)) => Err(AcceptError::Transport(e.to_string())),
            None => Err(AcceptError::Closed),
        }
    }

    async fn close(&mut self) -> Result<(), TunnelError> {
        self.inner.close().await.map_err(|e| TunnelError::Close {
            id: self.inner.id().to_string(),
            reason: e.to_string(),
        })
    }
}
