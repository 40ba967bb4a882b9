//! WebSocket upstream session with auto-reconnect.
//!
//! Opens the device's long-lived session to the message-routing endpoint,
//! presenting the bearer token and device identity on the upgrade request.
//! A background task owns the socket: it reconnects with exponential
//! backoff, tracks missed pings, and moves opaque binary frames between the
//! socket and two bounded channels.
//!
//! # Example
//!
//! ```rust,ignore
//! use uplink_api::{UpstreamClient, UpstreamConnector, WebSocketConnector};
//!
//! let client = WebSocketConnector.connect(client_config).await?;
//! let mut inbound = client.take_inbound().await.expect("first take");
//!
//! while let Some(frame) = inbound.recv().await {
//!     println!("{} bytes from upstream", frame.len());
//! }
//!
//! client.close().await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::Connector;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, http::HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use super::{
    ClientConfig, ConnectError, PingConfig, PingMissHandler, UpstreamClient, UpstreamConnector,
};
use crate::backoff::Backoff;
use crate::error::Error;

// ── Upgrade request headers ──────────────────────────────────────────

pub const DEVICE_NAME_HEADER: &str = "X-Webpa-Device-Name";
pub const FIRMWARE_NAME_HEADER: &str = "X-Webpa-Firmware-Name";
pub const MODEL_NAME_HEADER: &str = "X-Webpa-Model-Name";
pub const MANUFACTURER_HEADER: &str = "X-Webpa-Manufacturer";
pub const AUTHORIZATION_HEADER: &str = "Authorization";

// Stand-in deadline when `ping_wait` is too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

// ── SessionState ─────────────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Closed,
}

// ── WebSocketConnector ───────────────────────────────────────────────

/// Builds [`WebSocketClient`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl UpstreamConnector for WebSocketConnector {
    type Client = WebSocketClient;

    /// Validate the destination and headers, then spawn the session task.
    ///
    /// Returns once the task is spawned; the first connection attempt
    /// happens asynchronously.
    async fn connect(
        &self,
        config: ClientConfig,
    ) -> Result<WebSocketClient, ConnectError<WebSocketClient>> {
        let url = websocket_url(&config.destination_url)?;
        let request = upgrade_request(&url, &config)?;
        let connector = config
            .tls
            .as_ref()
            .map(|tls| Connector::Rustls(tls.rustls_config()));

        Ok(WebSocketClient::spawn(url, request, connector, &config))
    }
}

// ── WebSocketClient ──────────────────────────────────────────────────

/// Handle to a running upstream session.
pub struct WebSocketClient {
    outbound: mpsc::Sender<Bytes>,
    inbound: Mutex<Option<mpsc::Receiver<Bytes>>>,
    state: watch::Receiver<SessionState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketClient {
    fn spawn(
        url: Url,
        request: ClientRequestBuilder,
        connector: Option<Connector>,
        config: &ClientConfig,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_queue.size.max(1));
        let (inbound_tx, inbound_rx) = mpsc::channel(config.handle_msg_queue.size.max(1));
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        let cancel = CancellationToken::new();

        let session = Session {
            url,
            request,
            connector,
            backoff: Backoff::capped(config.max_backoff),
            ping: config.ping,
            handle_ping_miss: Arc::clone(&config.handle_ping_miss),
            inbound_tx,
            state_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(session.run(outbound_rx));

        Self {
            outbound: outbound_tx,
            inbound: Mutex::new(Some(inbound_rx)),
            state: state_rx,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Queue a frame for delivery upstream. Waits while the outbound
    /// backlog is full.
    pub async fn send(&self, frame: Bytes) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::SessionClosed);
        }
        self.outbound
            .send(frame)
            .await
            .map_err(|_| Error::SessionClosed)
    }

    /// Take the receiver for frames arriving from upstream.
    ///
    /// Only the first call returns `Some`.
    pub async fn take_inbound(&self) -> Option<mpsc::Receiver<Bytes>> {
        self.inbound.lock().await.take()
    }

    /// Current connection state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }
}

impl UpstreamClient for WebSocketClient {
    async fn close(&self) -> Result<(), Error> {
        self.cancel.cancel();

        let task = self.task.lock().await.take();
        if let Some(task) = task {
            task.await.map_err(|e| Error::SessionTask(e.to_string()))?;
            debug!("upstream session task joined");
        }
        Ok(())
    }
}

// ── Background session loop ──────────────────────────────────────────

struct Session {
    url: Url,
    request: ClientRequestBuilder,
    connector: Option<Connector>,
    backoff: Backoff,
    ping: PingConfig,
    handle_ping_miss: PingMissHandler,
    inbound_tx: mpsc::Sender<Bytes>,
    state_tx: watch::Sender<SessionState>,
    cancel: CancellationToken,
}

impl Session {
    /// Main loop: connect → serve → on error, backoff → reconnect.
    async fn run(self, mut outbound: mpsc::Receiver<Bytes>) {
        let mut attempt: u32 = 0;

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                result = self.connect_and_serve(&mut outbound) => {
                    match result {
                        // Server close frame or stream end: reconnect right away.
                        Ok(()) => {
                            if self.cancel.is_cancelled() {
                                break;
                            }
                            info!("upstream disconnected cleanly, reconnecting");
                            attempt = 0;
                        }
                        Err(e) => {
                            warn!(error = %e, attempt, "upstream session error");

                            let delay = self.backoff.delay(attempt);
                            attempt = attempt.saturating_add(1);
                            let _ = self.state_tx.send(SessionState::Reconnecting { attempt });
                            info!(
                                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                                attempt,
                                "waiting before reconnect"
                            );

                            tokio::select! {
                                biased;
                                () = self.cancel.cancelled() => break,
                                () = tokio::time::sleep(delay) => {}
                            }
                        }
                    }
                }
            }
        }

        let _ = self.state_tx.send(SessionState::Closed);
        debug!("upstream session loop exiting");
    }

    /// Establish a single connection and pump frames until it drops.
    async fn connect_and_serve(&self, outbound: &mut mpsc::Receiver<Bytes>) -> Result<(), Error> {
        info!(url = %self.url, "connecting upstream");

        let (ws_stream, _response) = tokio_tungstenite::connect_async_tls_with_config(
            self.request.clone(),
            None,
            false,
            self.connector.clone(),
        )
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        info!("upstream connected");
        let _ = self.state_tx.send(SessionState::Connected);

        let (mut write, mut read) = ws_stream.split();
        let mut misses: u32 = 0;
        let mut deadline = ping_deadline(self.ping.ping_wait);
        let mut outbound_open = true;

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    let _ = write.send(tungstenite::Message::Close(None)).await;
                    return Ok(());
                }
                frame = outbound.recv(), if outbound_open => {
                    match frame {
                        Some(frame) => write
                            .send(tungstenite::Message::Binary(frame))
                            .await
                            .map_err(|e| Error::WebSocketConnect(e.to_string()))?,
                        None => outbound_open = false,
                    }
                }
                () = tokio::time::sleep_until(deadline) => {
                    misses = misses.saturating_add(1);
                    warn!(misses, "no ping from upstream within ping wait");
                    if misses >= self.ping.max_ping_miss {
                        misses = 0;
                        if let Err(e) = (self.handle_ping_miss)() {
                            warn!(error = %e, "ping miss handler failed");
                        }
                    }
                    deadline = ping_deadline(self.ping.ping_wait);
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(tungstenite::Message::Binary(data))) => self.deliver(data),
                        Some(Ok(tungstenite::Message::Ping(_))) => {
                            // tungstenite queues the pong reply itself
                            trace!("upstream ping");
                            misses = 0;
                            deadline = ping_deadline(self.ping.ping_wait);
                        }
                        Some(Ok(tungstenite::Message::Close(frame))) => {
                            if let Some(ref cf) = frame {
                                info!(code = %cf.code, reason = %cf.reason, "upstream close frame received");
                            } else {
                                info!("upstream close frame received (no payload)");
                            }
                            return Ok(());
                        }
                        Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                        None => {
                            info!("upstream stream ended");
                            return Ok(());
                        }
                        Some(Ok(_)) => {
                            // Text, Pong, Frame -- not part of the routing protocol
                        }
                    }
                }
            }
        }
    }

    fn deliver(&self, frame: Bytes) {
        match self.inbound_tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("inbound backlog full, dropping upstream frame"),
            Err(TrySendError::Closed(_)) => trace!("inbound receiver dropped, discarding frame"),
        }
    }
}

/// When the next ping is due. Saturates instead of overflowing the clock.
fn ping_deadline(ping_wait: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ping_wait).unwrap_or(now + FAR_FUTURE)
}

// ── Request construction ─────────────────────────────────────────────

/// Map the configured destination onto a WebSocket URL.
///
/// `http`/`https` become `ws`/`wss`; `ws`/`wss` pass through.
fn websocket_url(destination: &str) -> Result<Url, Error> {
    let mut url = Url::parse(destination)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::UpstreamSetup(format!(
                "unsupported upstream scheme '{other}'"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| Error::UpstreamSetup(format!("cannot use scheme '{scheme}' for {destination}")))?;
    Ok(url)
}

/// Build the upgrade request, rejecting header values the wire cannot carry.
fn upgrade_request(url: &Url, config: &ClientConfig) -> Result<ClientRequestBuilder, Error> {
    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::UpstreamSetup(e.to_string()))?;

    let mut headers = vec![
        (DEVICE_NAME_HEADER, config.device_name.clone()),
        (FIRMWARE_NAME_HEADER, config.firmware_name.clone()),
        (MODEL_NAME_HEADER, config.model_name.clone()),
        (MANUFACTURER_HEADER, config.manufacturer.clone()),
    ];
    let token = config.token.expose_secret();
    if !token.is_empty() {
        headers.push((AUTHORIZATION_HEADER, format!("Bearer {token}")));
    }

    let mut request = ClientRequestBuilder::new(uri);
    for (name, value) in headers {
        HeaderValue::from_str(&value).map_err(|_| Error::InvalidHeader { name })?;
        request = request.with_header(name, value);
    }
    Ok(request)
}

// ── Tests ────────────────────────────────────────────────────────────
