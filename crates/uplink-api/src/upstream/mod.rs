// ── Upstream client contract ──
//
// What the bootstrap hands to the persistent-connection client, and the
// two traits the session supervisor drives: a connector that builds the
// client and the client's close operation. The WebSocket implementation
// lives in `websocket`; tests substitute their own.

pub mod websocket;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::Error;
use crate::tls::ClientTls;

/// Called when the upstream stops answering pings.
pub type PingMissHandler = Arc<dyn Fn() -> Result<(), Error> + Send + Sync>;

// ── QueueConfig ──────────────────────────────────────────────────────

/// Worker count and backlog depth for one of the client's queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    pub max_workers: usize,
    pub size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            size: 100,
        }
    }
}

// ── PingConfig ───────────────────────────────────────────────────────

/// Keepalive policy: how long to wait for a ping, and how many misses
/// in a row trigger the ping-miss handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingConfig {
    pub ping_wait: Duration,
    pub max_ping_miss: u32,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            ping_wait: Duration::from_secs(180),
            max_ping_miss: 3,
        }
    }
}

// ── ClientConfig ─────────────────────────────────────────────────────

/// Everything the upstream client needs to open the session.
#[derive(Clone)]
pub struct ClientConfig {
    /// Canonical device identity, e.g. `mac:112233445566`.
    pub device_name: String,
    pub firmware_name: String,
    pub model_name: String,
    pub manufacturer: String,
    /// Upstream endpoint; validated by the connector.
    pub destination_url: String,

    pub outbound_queue: QueueConfig,
    pub encoder_queue: QueueConfig,
    pub decoder_queue: QueueConfig,
    pub handler_registry_queue: QueueConfig,
    pub handle_msg_queue: QueueConfig,

    /// Client identity for the session's TLS handshake. `None` uses defaults.
    pub tls: Option<ClientTls>,
    /// Bearer token; may be empty when the exchange degraded.
    pub token: SecretString,
    pub handle_ping_miss: PingMissHandler,
    pub ping: PingConfig,
    /// Ceiling for the reconnect backoff.
    pub max_backoff: Duration,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("device_name", &self.device_name)
            .field("firmware_name", &self.firmware_name)
            .field("model_name", &self.model_name)
            .field("manufacturer", &self.manufacturer)
            .field("destination_url", &self.destination_url)
            .field("outbound_queue", &self.outbound_queue)
            .field("encoder_queue", &self.encoder_queue)
            .field("decoder_queue", &self.decoder_queue)
            .field("handler_registry_queue", &self.handler_registry_queue)
            .field("handle_msg_queue", &self.handle_msg_queue)
            .field("tls", &self.tls.is_some())
            .field("token", &self.token)
            .field("ping", &self.ping)
            .field("max_backoff", &self.max_backoff)
            .finish_non_exhaustive()
    }
}

// ── Traits ───────────────────────────────────────────────────────────

/// A live upstream session.
pub trait UpstreamClient: Send + Sync + 'static {
    /// Close the session. Calling it again after success is a no-op.
    fn close(&self) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Builds an [`UpstreamClient`] from a [`ClientConfig`].
pub trait UpstreamConnector: Send + Sync {
    type Client: UpstreamClient;

    fn connect(
        &self,
        config: ClientConfig,
    ) -> impl Future<Output = Result<Self::Client, ConnectError<Self::Client>>> + Send;
}

// ── ConnectError ─────────────────────────────────────────────────────

/// Construction failure, optionally carrying a half-built client that
/// the caller is expected to close.
pub struct ConnectError<C> {
    pub source: Error,
    pub partial: Option<C>,
}

impl<C> ConnectError<C> {
    pub fn new(source: Error) -> Self {
        Self {
            source,
            partial: None,
        }
    }

    pub fn with_partial(source: Error, partial: C) -> Self {
        Self {
            source,
            partial: Some(partial),
        }
    }
}

impl<C> From<Error> for ConnectError<C> {
    fn from(source: Error) -> Self {
        Self::new(source)
    }
}

impl<C> fmt::Debug for ConnectError<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectError")
            .field("source", &self.source)
            .field("partial", &self.partial.is_some())
            .finish()
    }
}

impl<C> fmt::Display for ConnectError<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}
