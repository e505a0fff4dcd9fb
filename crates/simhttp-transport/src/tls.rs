use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use simhttp_core::{HttpError, Result, TlsConfig};
use tokio_rustls::TlsAcceptor;

/// Builds the acceptor for a secure listener from PEM certificate and key files.
pub fn load_acceptor(tls: &TlsConfig) -> Result<TlsAcceptor> {
    let certs = load_certs(&tls.cert_path)?;
    let key = load_key(&tls.key_path)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| HttpError::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| HttpError::Tls(format!("certificate rejected: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| HttpError::Tls(format!("cannot open {}: {}", path.display(), e)))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| HttpError::Tls(format!("invalid certificate in {}: {}", path.display(), e)))?;
    if certs.is_empty() {
        return Err(HttpError::Tls(format!("no certificate found in {}", path.display())));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .map_err(|e| HttpError::Tls(format!("cannot open {}: {}", path.display(), e)))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| HttpError::Tls(format!("invalid key in {}: {}", path.display(), e)))?
        .ok_or_else(|| HttpError::Tls(format!("no private key found in {}", path.display())))
}
