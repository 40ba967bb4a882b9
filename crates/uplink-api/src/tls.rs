//! mTLS client credential loading.
//!
//! Reads a PEM certificate chain and private key from disk and assembles
//! them into a single-certificate rustls client config. The resulting
//! [`ClientTls`] is shared by the token exchange call and, when the session
//! policy allows it, the upstream WebSocket.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

use crate::error::Error;

/// A loaded client identity, ready for outbound TLS.
///
/// Cheap to clone: the rustls config lives behind an `Arc`.
#[derive(Clone)]
pub struct ClientTls {
    config: Arc<ClientConfig>,
}

impl ClientTls {
    /// The shared rustls config (for `tokio-tungstenite` connectors).
    pub fn rustls_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.config)
    }

    /// An owned copy of the rustls config (for `reqwest::ClientBuilder::use_preconfigured_tls`).
    pub fn to_rustls(&self) -> ClientConfig {
        ClientConfig::clone(&self.config)
    }
}

impl fmt::Debug for ClientTls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientTls")
            .field("alpn_protocols", &self.config.alpn_protocols)
            .finish_non_exhaustive()
    }
}

/// Load a PEM certificate/key pair into a client TLS config.
///
/// Fails with [`Error::CredentialLoad`] when either file is missing or
/// unreadable, the certificate file holds no certificates, the key cannot
/// be parsed, or rustls rejects the pair.
pub fn load_client_tls(
    cert_path: impl AsRef<Path>,
    key_path: impl AsRef<Path>,
) -> Result<ClientTls, Error> {
    let cert_path = cert_path.as_ref();
    let key_path = key_path.as_ref();

    let cert_pem = std::fs::read(cert_path)
        .map_err(|e| credential_error(cert_path, format!("unreadable certificate: {e}")))?;
    let key_pem = std::fs::read(key_path)
        .map_err(|e| credential_error(key_path, format!("unreadable private key: {e}")))?;

    let chain = CertificateDer::pem_slice_iter(&cert_pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| credential_error(cert_path, format!("invalid certificate PEM: {e}")))?;
    if chain.is_empty() {
        return Err(credential_error(cert_path, "no certificates found".into()));
    }

    let key = PrivateKeyDer::from_pem_slice(&key_pem)
        .map_err(|e| credential_error(key_path, format!("invalid private key PEM: {e}")))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| credential_error(cert_path, format!("unsupported protocol set: {e}")))?
        .with_root_certificates(webpki_root_store())
        .with_client_auth_cert(chain, key)
        .map_err(|e| credential_error(cert_path, format!("certificate/key pair rejected: {e}")))?;

    tracing::debug!(cert = %cert_path.display(), "loaded mTLS client certificate");

    Ok(ClientTls {
        config: Arc::new(config),
    })
}

fn webpki_root_store() -> RootCertStore {
    RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    }
}

fn credential_error(path: &Path, reason: String) -> Error {
    Error::CredentialLoad {
        path: path.to_path_buf(),
        reason,
    }
}
