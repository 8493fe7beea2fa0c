//! TLS configuration and certificate loading.
//!
//! The hardening policy is fixed: TLS 1.3 only, server-chosen cipher order,
//! P-256 as the sole key exchange group, AES-GCM suites only.

use std::fs;
use std::io::BufReader;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::crypto::aws_lc_rs::{cipher_suite, default_provider, kx_group};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use thiserror::Error;

use crate::config::{PemSource, TlsPolicy};

/// Malformed or unreadable certificate/key material.
#[derive(Debug, Error)]
pub enum TlsConfigError {
    #[error("failed to read {what} from {source_name}: {error}")]
    Read {
        what: &'static str,
        source_name: String,
        #[source]
        error: std::io::Error,
    },
    #[error("no certificates found in {0}")]
    NoCertificates(String),
    #[error("no private key found in {0}")]
    NoPrivateKey(String),
    #[error("TLS policy is not active: certificate and key are both required")]
    Inactive,
    #[error("rejected by TLS backend: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Crypto provider restricted to the hardened suite and group list.
pub fn hardened_provider() -> CryptoProvider {
    CryptoProvider {
        cipher_suites: vec![
            cipher_suite::TLS13_AES_256_GCM_SHA384,
            cipher_suite::TLS13_AES_128_GCM_SHA256,
        ],
        kx_groups: vec![kx_group::SECP256R1],
        ..default_provider()
    }
}

/// Build a rustls server config enforcing the hardened policy.
pub fn server_config(policy: &TlsPolicy) -> Result<ServerConfig, TlsConfigError> {
    if !policy.is_active() {
        return Err(TlsConfigError::Inactive);
    }

    let certs = load_certificates(&policy.certificate)?;
    let key = load_private_key(&policy.key)?;

    let mut config = ServerConfig::builder_with_provider(Arc::new(hardened_provider()))
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    config.ignore_client_order = true;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(config)
}

/// Load the policy into the form `axum-server` accepts.
pub fn load_tls_config(policy: &TlsPolicy) -> Result<RustlsConfig, TlsConfigError> {
    let config = server_config(policy)?;

    tracing::debug!(
        certificate = %policy.certificate,
        "TLS configuration loaded"
    );

    Ok(RustlsConfig::from_config(Arc::new(config)))
}

fn read_pem(source: &PemSource, what: &'static str) -> Result<Vec<u8>, TlsConfigError> {
    match source {
        PemSource::Bytes(bytes) => Ok(bytes.clone()),
        PemSource::Path(path) => fs::read(path).map_err(|error| TlsConfigError::Read {
            what,
            source_name: path.display().to_string(),
            error,
        }),
    }
}

fn load_certificates(source: &PemSource) -> Result<Vec<CertificateDer<'static>>, TlsConfigError> {
    let pem = read_pem(source, "certificate")?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(pem.as_slice()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| TlsConfigError::Read {
            what: "certificate",
            source_name: source.to_string(),
            error,
        })?;

    if certs.is_empty() {
        return Err(TlsConfigError::NoCertificates(source.to_string()));
    }
    Ok(certs)
}

fn load_private_key(source: &PemSource) -> Result<PrivateKeyDer<'static>, TlsConfigError> {
    let pem = read_pem(source, "private key")?;
    rustls_pemfile::private_key(&mut BufReader::new(pem.as_slice()))
        .map_err(|error| TlsConfigError::Read {
            what: "private key",
            source_name: source.to_string(),
            error,
        })?
        .ok_or_else(|| TlsConfigError::NoPrivateKey(source.to_string()))
}
