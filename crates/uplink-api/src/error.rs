use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the `uplink-api` crate.
///
/// Covers every failure mode of the transport layer: credential loading,
/// HTTP transport, token exchange, and the upstream WebSocket session.
/// `uplink-core` maps these into bootstrap-stage errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Credentials ─────────────────────────────────────────────────
    /// The mTLS certificate/key pair could not be read or assembled.
    #[error("failed to load mTLS credentials from {path}: {reason}")]
    CredentialLoad { path: PathBuf, reason: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, TLS handshake, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP client could not be built from the transport config.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Token exchange ──────────────────────────────────────────────
    /// The token endpoint answered but its body could not be read.
    #[error("failed to read token response (HTTP {status}): {source}")]
    TokenBody {
        status: u16,
        #[source]
        source: reqwest::Error,
    },

    /// A request header could not be encoded (non-visible ASCII in a config value).
    #[error("invalid value for header {name}")]
    InvalidHeader { name: &'static str },

    // ── Upstream session ────────────────────────────────────────────
    /// The upstream client could not be configured or started.
    #[error("upstream client setup failed: {0}")]
    UpstreamSetup(String),

    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// The upstream session is closed and can no longer carry frames.
    #[error("upstream session closed")]
    SessionClosed,

    /// The background session task ended abnormally.
    #[error("upstream session task failed: {0}")]
    SessionTask(String),
}
