//! TLS helpers
//!
//! - Client configuration for re-encrypting traffic towards HTTPS backends
//! - Loading extra CA certificates for the provider session

use crate::error::TunnelError;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use rustls_pemfile::certs;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsConnector;

/// Accepts any backend certificate.
///
/// The hop from the tunnel to an in-cluster service is trusted by network
/// topology; backend certificates are usually self-signed or issued for a
/// name other than the cluster DNS name.
#[derive(Debug)]
struct SkipServerVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Builds the connector used to wrap backend connections in TLS.
///
/// Certificate verification is skipped; see [`SkipServerVerification`].
pub fn backend_tls_connector() -> Result<TlsConnector, TunnelError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| TunnelError::Tls(format!("Failed to build backend TLS config: {}", e)))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(SkipServerVerification(provider)))
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Reads every `*.crt` file in `dir` and returns the concatenated PEM bundle.
///
/// Returns `Ok(None)` when the directory does not exist. Files that contain
/// no parseable certificate are rejected rather than silently skipped.
pub fn load_ca_bundle(dir: &Path) -> Result<Option<Vec<u8>>, TunnelError> {
    if !dir.is_dir() {
        return Ok(None);
    }

    let entries = std::fs::read_dir(dir).map_err(|e| {
        TunnelError::Certificate(format!("Failed to read CA directory {:?}: {}", dir, e))
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            TunnelError::Certificate(format!("Failed to read CA directory {:?}: {}", dir, e))
        })?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "crt") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut bundle = Vec::new();
    for path in paths {
        let pem = std::fs::read(&path).map_err(|e| {
            TunnelError::Certificate(format!("Failed to read {:?}: {}", path, e))
        })?;
        let parsed = certs(&mut Cursor::new(&pem))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TunnelError::Certificate(format!("Failed to parse {:?}: {}", path, e)))?;
        if parsed.is_empty() {
            return Err(TunnelError::Certificate(format!("No certificates found in {:?}", path)));
        }
        bundle.extend_from_slice(&pem);
        if !pem.ends_with(b"\n") {
            bundle.push(b'\n');
        }
    }

    Ok(Some(bundle))
}
