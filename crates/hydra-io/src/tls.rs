//! TLS material for the HTTPS listener.
//!
//! Certificate and key files are checked here before they are handed to the
//! listener, so a bad path or an empty PEM fails at startup with a clear error.

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls_pemfile::{certs, private_key};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;
use tiny_http::SslConfig;

/// Errors that can occur during TLS configuration
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("Failed to read certificate file: {0}")]
    CertReadError(#[from] std::io::Error),

    #[error("No certificates found in file")]
    NoCertificates,

    #[error("No private key found in file")]
    NoPrivateKey,

    #[error("HTTPS needs both a certificate file and a key file")]
    NotConfigured,

    #[error("Failed to build TLS config: {0}")]
    ConfigError(String),
}

/// TLS configuration for the control API listener
#[derive(Clone, Debug, Default)]
pub struct TlsConfig {
    /// Path to the server certificate file (PEM format)
    pub cert_path: String,
    /// Path to the server private key file (PEM format)
    pub key_path: String,
    /// Whether TLS is enabled
    pub enabled: bool,
}

impl TlsConfig {
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.cert_path.is_empty() && !self.key_path.is_empty()
    }
}

/// Load certificates from a PEM file
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let certs_result: Result<Vec<_>, _> = certs(&mut reader).collect();
    let certs = certs_result.map_err(TlsError::CertReadError)?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates);
    }

    Ok(certs)
}

/// Load private key from a PEM file
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    private_key(&mut reader)
        .map_err(TlsError::CertReadError)?
        .ok_or(TlsError::NoPrivateKey)
}

/// Validate the PEM files and package them for the HTTPS listener.
pub fn load_ssl_config(config: &TlsConfig) -> Result<SslConfig, TlsError> {
    if !config.is_configured() {
        return Err(TlsError::NotConfigured);
    }
    let cert_path = Path::new(&config.cert_path);
    let key_path = Path::new(&config.key_path);

    let chain = load_certs(cert_path)?;
    load_private_key(key_path)?;
    tracing::debug!(certificates = chain.len(), "Loaded TLS certificate chain");

    Ok(SslConfig {
        certificate: std::fs::read(cert_path)?,
        private_key: std::fs::read(key_path)?,
    })
}

/// Generate a self-signed certificate for development/testing
#[cfg(feature = "dev-certs")]
pub fn generate_dev_cert(output_cert: &Path, output_key: &Path) -> Result<(), TlsError> {
    use rcgen::{generate_simple_self_signed, CertifiedKey};

    let subject_alt_names = vec!["localhost".to_string(), "127.0.0.1".to_string()];
    let CertifiedKey { cert, key_pair } = generate_simple_self_signed(subject_alt_names)
        .map_err(|e| TlsError::ConfigError(e.to_string()))?;

    std::fs::write(output_cert, cert.pem())?;
    std::fs::write(output_key, key_pair.serialize_pem())?;

    Ok(())
}
