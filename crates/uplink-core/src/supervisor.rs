// ── Upstream session supervisor ──
//
// Runs the bootstrap sequence once: network gate, mTLS load, token fetch,
// client construction. Each stage yields a tagged `StageOutcome`; only
// client construction can end the sequence early. On success the session
// is registered with the process lifecycle so shutdown closes it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use secrecy::SecretString;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uplink_api::{
    ClientConfig, ClientTls, ConnectError, PingConfig, PingMissHandler, QueueConfig, TokenClient,
    TokenRequest, TransportConfig, UpstreamClient, UpstreamConnector, load_client_tls,
};

use crate::config::Config;
use crate::error::CoreError;
use crate::lifecycle::{Lifecycle, StopHook};
use crate::network::{NetworkGate, Reachability};

/// Missed pings tolerated before the ping-miss handler runs.
pub const MAX_PING_MISS: u32 = 3;

const QUEUE: QueueConfig = QueueConfig {
    max_workers: 5,
    size: 100,
};

const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

// ── State ───────────────────────────────────────────────────────────

/// Where the bootstrap sequence currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SupervisorState {
    Idle,
    Provisioning,
    Constructing,
    Active,
    Failed,
}

/// Result of one bootstrap stage.
#[derive(Debug)]
pub enum StageOutcome<T> {
    Ok(T),
    /// The stage failed but produced a fallback value to carry on with.
    Degraded { value: T, reason: CoreError },
    Fatal(CoreError),
}

impl<T> StageOutcome<T> {
    pub fn status(&self) -> StageStatus {
        match self {
            Self::Ok(_) => StageStatus::Ok,
            Self::Degraded { reason, .. } => StageStatus::Degraded(reason.to_string()),
            Self::Fatal(reason) => StageStatus::Fatal(reason.to_string()),
        }
    }

    /// The usable value, or the fatal error.
    pub fn into_result(self) -> Result<T, CoreError> {
        match self {
            Self::Ok(value) | Self::Degraded { value, .. } => Ok(value),
            Self::Fatal(reason) => Err(reason),
        }
    }
}

/// Stage outcome with the value stripped, kept for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Ok,
    Degraded(String),
    Fatal(String),
}

impl StageStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// What happened at each stage of a successful bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub network: Reachability,
    pub tls: StageStatus,
    pub token: StageStatus,
    pub client: StageStatus,
}

// ── Supervisor ──────────────────────────────────────────────────────

pub struct Supervisor<K> {
    connector: K,
    gate: Option<NetworkGate>,
    token_timeout: Duration,
    state: watch::Sender<SupervisorState>,
}

impl<K: UpstreamConnector> Supervisor<K> {
    pub fn new(connector: K) -> Self {
        let (state, _) = watch::channel(SupervisorState::Idle);
        Self {
            connector,
            gate: None,
            token_timeout: DEFAULT_TOKEN_TIMEOUT,
            state,
        }
    }

    /// Replace the gate derived from the config at start time.
    pub fn with_network_gate(mut self, gate: NetworkGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Upper bound on the token request.
    pub fn with_token_timeout(mut self, timeout: Duration) -> Self {
        self.token_timeout = timeout;
        self
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Bootstrap the upstream session.
    ///
    /// TLS and token failures are logged and degrade to no TLS and an
    /// empty token. A construction failure closes whatever the connector
    /// left behind and is returned; nothing is registered with `lifecycle`
    /// in that case.
    ///
    /// A supervisor bootstraps once. Calling `start` again, whether the
    /// first run is still going, succeeded or failed, returns
    /// [`CoreError::AlreadyStarted`] without touching the network.
    pub async fn start(
        &self,
        config: &Config,
        lifecycle: &mut Lifecycle,
    ) -> Result<SessionHandle<K::Client>, CoreError> {
        self.claim()?;

        let gate = self
            .gate
            .clone()
            .unwrap_or_else(|| NetworkGate::from_config(config));
        let network = gate.wait_for_network(&config.url).await;
        if !network.is_reachable() {
            warn!(outcome = ?network, "continuing without confirmed network");
        }

        let tls = load_tls(config);
        let tls_status = tls.status();
        let tls = tls.into_result()?;

        let token = self.fetch_token(config, tls.clone()).await;
        let token_status = token.status();
        let token = token.into_result()?;

        self.transition(SupervisorState::Constructing);
        let session_tls = if config.reuse_mtls_for_session {
            tls
        } else {
            None
        };
        let client_config = client_config(config, session_tls, token);

        let client = match self.construct(client_config).await {
            StageOutcome::Fatal(e) => {
                self.transition(SupervisorState::Failed);
                return Err(e);
            }
            outcome => outcome.into_result()?,
        };

        let report = BootstrapReport {
            network,
            tls: tls_status,
            token: token_status,
            client: StageStatus::Ok,
        };
        let handle = SessionHandle::new(client, report);
        lifecycle.append(handle.clone());
        self.transition(SupervisorState::Active);
        info!(device_id = %config.device_id, url = %config.url, "upstream session started");

        Ok(handle)
    }

    async fn fetch_token(&self, config: &Config, tls: Option<ClientTls>) -> StageOutcome<SecretString> {
        let transport = TransportConfig {
            timeout: self.token_timeout,
            ..TransportConfig::default()
        }
        .with_tls(tls);

        let result = match TokenClient::new(&config.auth_token_url, &transport) {
            Ok(client) => client.fetch(&token_request(config)).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(token) => StageOutcome::Ok(token),
            Err(e) => {
                error!(error = %e, "failed to get token, continuing without one");
                StageOutcome::Degraded {
                    value: SecretString::from(String::new()),
                    reason: CoreError::TokenFetch(e),
                }
            }
        }
    }

    async fn construct(&self, client_config: ClientConfig) -> StageOutcome<K::Client> {
        match self.connector.connect(client_config).await {
            Ok(client) => StageOutcome::Ok(client),
            Err(ConnectError { source, partial }) => {
                error!(error = %source, "failed to create upstream client");
                if let Some(partial) = partial {
                    if let Err(e) = partial.close().await {
                        warn!(error = %e, "failed to close partially built upstream client");
                    }
                }
                StageOutcome::Fatal(CoreError::ClientConstruction(source))
            }
        }
    }

    /// Move Idle to Provisioning, or refuse if that already happened.
    fn claim(&self) -> Result<(), CoreError> {
        let claimed = self.state.send_if_modified(|state| {
            if *state == SupervisorState::Idle {
                *state = SupervisorState::Provisioning;
                true
            } else {
                false
            }
        });
        if claimed {
            debug!(state = %SupervisorState::Provisioning, "supervisor state");
            Ok(())
        } else {
            let state = self.state();
            warn!(%state, "bootstrap requested twice");
            Err(CoreError::AlreadyStarted { state })
        }
    }

    fn transition(&self, next: SupervisorState) {
        debug!(state = %next, "supervisor state");
        self.state.send_replace(next);
    }
}

fn load_tls(config: &Config) -> StageOutcome<Option<ClientTls>> {
    match load_client_tls(&config.mtls_client_cert_path, &config.mtls_client_key_path) {
        Ok(tls) => {
            debug!(cert = %config.mtls_client_cert_path, "mTLS identity loaded");
            StageOutcome::Ok(Some(tls))
        }
        Err(e) => {
            error!(error = %e, "failed to load mTLS config, using default TLS");
            StageOutcome::Degraded {
                value: None,
                reason: CoreError::CredentialLoad(e),
            }
        }
    }
}

fn token_request(config: &Config) -> TokenRequest {
    TokenRequest {
        mac_address: config.hardware_mac.to_string(),
        serial_number: config.hardware_serial_number.clone(),
        partner_id: config.partner_id.clone(),
        hardware_model: config.hardware_model.clone(),
        hardware_manufacturer: config.hardware_manufacturer.clone(),
        firmware_name: config.firmware_name.clone(),
        protocol: config.protocol.clone(),
        interface_used: config.interface.clone(),
        last_reboot_reason: config.hardware_last_reboot_reason.clone(),
    }
}

fn client_config(config: &Config, tls: Option<ClientTls>, token: SecretString) -> ClientConfig {
    ClientConfig {
        device_name: config.device_id.to_string(),
        firmware_name: config.firmware_name.clone(),
        model_name: config.hardware_model.clone(),
        manufacturer: config.hardware_manufacturer.clone(),
        destination_url: config.url.clone(),
        outbound_queue: QUEUE,
        encoder_queue: QUEUE,
        decoder_queue: QUEUE,
        handler_registry_queue: QUEUE,
        handle_msg_queue: QUEUE,
        tls,
        token,
        handle_ping_miss: ping_miss_handler(),
        ping: PingConfig {
            ping_wait: Duration::from_secs(config.ping_timeout),
            max_ping_miss: MAX_PING_MISS,
        },
        max_backoff: Duration::from_secs(config.max_backoff),
    }
}

fn ping_miss_handler() -> PingMissHandler {
    // TODO: tear down and rebuild the session here instead of only logging.
    Arc::new(|| {
        error!("ping miss");
        Ok(())
    })
}

// ── SessionHandle ───────────────────────────────────────────────────

/// Shared handle to the live upstream session.
///
/// Clones refer to the same session. `shutdown` closes the client once;
/// later calls return `Ok(())` without touching it.
pub struct SessionHandle<C> {
    inner: Arc<SessionInner<C>>,
}

struct SessionInner<C> {
    client: C,
    closed: AtomicBool,
    report: BootstrapReport,
}

impl<C> Clone for SessionHandle<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: UpstreamClient> SessionHandle<C> {
    fn new(client: C, report: BootstrapReport) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                client,
                closed: AtomicBool::new(false),
                report,
            }),
        }
    }

    pub fn client(&self) -> &C {
        &self.inner.client
    }

    pub fn report(&self) -> &BootstrapReport {
        &self.inner.report
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub async fn shutdown(&self) -> Result<(), CoreError> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("closing upstream session");
        self.inner.client.close().await.map_err(CoreError::Shutdown)
    }
}

impl<C: UpstreamClient> StopHook for SessionHandle<C> {
    fn name(&self) -> &str {
        "upstream-session"
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), CoreError>> {
        self.shutdown().boxed()
    }
}

impl<C> std::fmt::Debug for SessionHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .field("report", &self.inner.report)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn outcome_status_and_value() {
        let ok: StageOutcome<u8> = StageOutcome::Ok(1);
        assert_eq!(ok.status(), StageStatus::Ok);
        assert_eq!(ok.into_result().unwrap(), 1);

        let degraded = StageOutcome::Degraded {
            value: 0_u8,
            reason: CoreError::TokenFetch(uplink_api::Error::SessionClosed),
        };
        assert!(matches!(degraded.status(), StageStatus::Degraded(_)));
        assert_eq!(degraded.into_result().unwrap(), 0);

        let fatal: StageOutcome<u8> =
            StageOutcome::Fatal(CoreError::ClientConstruction(uplink_api::Error::SessionClosed));
        assert!(matches!(fatal.status(), StageStatus::Fatal(_)));
        assert!(fatal.into_result().is_err());
    }

    #[test]
    fn state_display() {
        assert_eq!(SupervisorState::Provisioning.to_string(), "provisioning");
        assert_eq!(SupervisorState::Failed.to_string(), "failed");
    }

    #[test]
    fn ping_miss_handler_never_fails() {
        let handler = ping_miss_handler();
        assert!(handler().is_ok());
        assert!(handler().is_ok());
    }
}
