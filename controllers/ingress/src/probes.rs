//! Health probe server
//!
//! - `GET /healthz` - liveness, always `ok`
//! - `GET /readyz` - readiness, `ok` once the resource store is seeded

use crate::error::ControllerError;
use crate::store::ResourceStore;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the probe router over `store`
pub fn probe_routes(store: Arc<ResourceStore>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(ready))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

async fn ready(State(store): State<Arc<ResourceStore>>) -> (StatusCode, &'static str) {
    if store.is_seeded() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "store not seeded")
    }
}

/// Serve the probes on `addr` until the server fails
pub async fn serve_probes(addr: SocketAddr, store: Arc<ResourceStore>) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ControllerError::Probe(format!("Failed to bind {}: {}", addr, e)))?;
    info!(addr = %addr, "Probe server started");

    axum::serve(listener, probe_routes(store))
        .await
        .map_err(|e| ControllerError::Probe(e.to_string()))
}
