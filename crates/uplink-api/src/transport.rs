// Shared transport configuration for building reqwest::Client instances.
//
// The token exchange is the only HTTP caller today. Clients built here
// never follow redirects: a redirect response is treated as final so
// device credentials are not replayed to another hop.

use std::time::Duration;

use reqwest::redirect;

use crate::tls::ClientTls;

const USER_AGENT: &str = concat!("uplink/", env!("CARGO_PKG_VERSION"));

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Client identity presented during the TLS handshake. `None` falls
    /// back to reqwest's rustls defaults (server auth only).
    pub tls: Option<ClientTls>,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// Attach (or clear) the mTLS client identity.
    pub fn with_tls(mut self, tls: Option<ClientTls>) -> Self {
        self.tls = tls;
        self
    }

    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::none());

        if let Some(ref tls) = self.tls {
            builder = builder.use_preconfigured_tls(tls.to_rustls());
        }

        builder
            .build()
            .map_err(|e| crate::error::Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_transport() {
        let config = TransportConfig::default();
        assert!(config.tls.is_none());
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn builds_without_client_identity() {
        assert!(TransportConfig::default().build_client().is_ok());
    }
}
