//! TLS material for secure server sessions

use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use wsmux_common::config::TlsSettings;

/// TLS loading errors
#[derive(Debug, thiserror::Error)]
pub enum TlsSetupError {
    #[error("Failed to read certificates from {path}: {reason}")]
    Certificates { path: PathBuf, reason: String },

    #[error("Failed to read private key from {path}: {reason}")]
    PrivateKey { path: PathBuf, reason: String },

    #[error("No certificates found in {0}")]
    EmptyChain(PathBuf),

    #[error("Invalid server certificate: {0}")]
    Config(#[from] rustls::Error),
}

/// Build an acceptor from PEM-encoded certificate chain and key files
pub fn load_acceptor(settings: &TlsSettings) -> Result<TlsAcceptor, TlsSetupError> {
    let cert_path = &settings.cert_path;
    let key_path = &settings.key_path;

    let certs = CertificateDer::pem_file_iter(cert_path)
        .and_then(|iter| iter.collect::<Result<Vec<_>, _>>())
        .map_err(|e| TlsSetupError::Certificates {
            path: cert_path.clone(),
            reason: e.to_string(),
        })?;
    if certs.is_empty() {
        return Err(TlsSetupError::EmptyChain(cert_path.clone()));
    }

    let key = PrivateKeyDer::from_pem_file(key_path).map_err(|e| TlsSetupError::PrivateKey {
        path: key_path.clone(),
        reason: e.to_string(),
    })?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    tracing::info!(cert = %cert_path.display(), "TLS certificate loaded");
    Ok(TlsAcceptor::from(Arc::new(config)))
}
