use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::RootCertStore;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;

use crate::config::TlsConfig;
use crate::error::ServerError;

/// Build a rustls server config from PEM files.
///
/// When `ca_file` is set, clients must present a certificate signed by
/// that bundle (mutual TLS); otherwise client certificates are not
/// requested.
///
/// # Errors
///
/// Returns [`ServerError::Io`] for unreadable files and
/// [`ServerError::Tls`] for malformed or unusable certificate material.
pub fn rustls_server_config(config: &TlsConfig) -> Result<rustls::ServerConfig, ServerError> {
    // Pick the ring provider before any builder runs; a no-op if one is
    // already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let certs = load_certs(&config.cert_file)?;
    let key = load_private_key(&config.key_file)?;

    let builder = rustls::ServerConfig::builder();
    let server_config = match &config.ca_file {
        Some(ca_file) => {
            let mut roots = RootCertStore::empty();
            for cert in load_certs(ca_file)? {
                roots
                    .add(cert)
                    .map_err(|e| ServerError::Tls(format!("invalid CA certificate: {e}")))?;
            }
            let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
                .build()
                .map_err(|e| ServerError::Tls(format!("client verifier: {e}")))?;
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    }
    .with_single_cert(certs, key)
    .map_err(|e| ServerError::Tls(format!("certificate/key mismatch: {e}")))?;

    Ok(server_config)
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let mut reader = BufReader::new(File::open(path)?);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Tls(format!("failed to parse certificates in {path}: {e}")))?;
    if certs.is_empty() {
        return Err(ServerError::Tls(format!("no certificates found in {path}")));
    }
    Ok(certs)
}

fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>, ServerError> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| ServerError::Tls(format!("failed to parse private key in {path}: {e}")))?
        .ok_or_else(|| ServerError::Tls(format!("no private key found in {path}")))
}
