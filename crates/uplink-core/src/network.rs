// ── Network reachability gate ──
//
// Blocks bootstrap until the upstream host accepts a TCP connection.
// Never fails: the outcome is reported as a `Reachability` value and the
// supervisor carries on either way.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpStream, lookup_host};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uplink_api::Backoff;
use url::{Host, Url};

use crate::config::Config;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ── AddressFamily ───────────────────────────────────────────────────

/// Which resolved addresses the gate may dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressFamily {
    #[default]
    Any,
    V4,
    V6,
}

impl AddressFamily {
    /// Both flags set is the same as neither.
    pub fn from_flags(force_ipv4: bool, force_ipv6: bool) -> Self {
        match (force_ipv4, force_ipv6) {
            (true, false) => Self::V4,
            (false, true) => Self::V6,
            _ => Self::Any,
        }
    }

    fn admits(self, addr: &SocketAddr) -> bool {
        match self {
            Self::Any => true,
            Self::V4 => addr.is_ipv4(),
            Self::V6 => addr.is_ipv6(),
        }
    }
}

// ── Reachability ────────────────────────────────────────────────────

/// How the wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reachability {
    Reachable { attempts: u32 },
    GaveUp { attempts: u32 },
    Cancelled,
    /// The URL carried no host or port to dial.
    Skipped { reason: String },
}

impl Reachability {
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable { .. })
    }
}

// ── NetworkGate ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NetworkGate {
    backoff: Backoff,
    max_attempts: Option<u32>,
    connect_timeout: Duration,
    family: AddressFamily,
    cancel: CancellationToken,
}

impl Default for NetworkGate {
    fn default() -> Self {
        Self::new(Backoff::default())
    }
}

impl NetworkGate {
    /// Gate that retries forever with `backoff` between attempts.
    pub fn new(backoff: Backoff) -> Self {
        Self {
            backoff,
            max_attempts: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            family: AddressFamily::Any,
            cancel: CancellationToken::new(),
        }
    }

    /// Backoff ceiling and address family taken from the device config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            family: AddressFamily::from_flags(config.force_ipv4, config.force_ipv6),
            ..Self::new(Backoff::capped(Duration::from_secs(config.max_backoff)))
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_family(mut self, family: AddressFamily) -> Self {
        self.family = family;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Wait until `url`'s host accepts a TCP connection, the attempt limit
    /// runs out, or the gate is cancelled.
    pub async fn wait_for_network(&self, url: &str) -> Reachability {
        let (host, port) = match target(url) {
            Ok(target) => target,
            Err(reason) => {
                warn!(url, %reason, "not probing upstream");
                return Reachability::Skipped { reason };
            }
        };

        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);

            let reached = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Reachability::Cancelled,
                reached = self.try_connect(&host, port) => reached,
            };
            if reached {
                info!(host = %host, port, attempts, "network reachable");
                return Reachability::Reachable { attempts };
            }

            if self.max_attempts.is_some_and(|max| attempts >= max) {
                warn!(host = %host, port, attempts, "giving up on network wait");
                return Reachability::GaveUp { attempts };
            }

            let delay = self.backoff.delay(attempts - 1);
            debug!(
                host = %host,
                attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "network not reachable yet"
            );
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Reachability::Cancelled,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn try_connect(&self, host: &str, port: u16) -> bool {
        let addrs = match lookup_host((host, port)).await {
            Ok(addrs) => addrs,
            Err(e) => {
                debug!(host, error = %e, "resolve failed");
                return false;
            }
        };

        for addr in addrs.filter(|a| self.family.admits(a)) {
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(_)) => return true,
                Ok(Err(e)) => debug!(%addr, error = %e, "connect failed"),
                Err(_) => debug!(%addr, "connect timed out"),
            }
        }
        false
    }
}

fn target(url: &str) -> Result<(String, u16), String> {
    let parsed = Url::parse(url).map_err(|e| format!("invalid url: {e}"))?;
    let host = match parsed.host() {
        Some(Host::Domain(domain)) => domain.to_owned(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => return Err("url has no host".into()),
    };
    let port = parsed
        .port_or_known_default()
        .ok_or_else(|| format!("no port for scheme '{}'", parsed.scheme()))?;
    Ok((host, port))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    fn fast_gate() -> NetworkGate {
        NetworkGate::new(Backoff {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
        })
        .with_connect_timeout(Duration::from_secs(1))
    }

    #[test]
    fn family_from_flags() {
        assert_eq!(AddressFamily::from_flags(false, false), AddressFamily::Any);
        assert_eq!(AddressFamily::from_flags(true, false), AddressFamily::V4);
        assert_eq!(AddressFamily::from_flags(false, true), AddressFamily::V6);
        assert_eq!(AddressFamily::from_flags(true, true), AddressFamily::Any);
    }

    #[test]
    fn target_uses_scheme_default_port() {
        assert_eq!(target("https://host/api").unwrap(), ("host".into(), 443));
        assert_eq!(target("http://[::1]:81").unwrap(), ("::1".into(), 81));
        assert!(target("tcp://127.0.0.1").is_err());
        assert!(target("not a url").is_err());
    }

    #[tokio::test]
    async fn listening_socket_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let outcome = fast_gate()
            .wait_for_network(&format!("http://{addr}/api/v2/device"))
            .await;
        assert_eq!(outcome, Reachability::Reachable { attempts: 1 });
    }

    #[tokio::test]
    async fn closed_port_gives_up() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let outcome = fast_gate()
            .with_max_attempts(2)
            .wait_for_network(&format!("http://{addr}"))
            .await;
        assert_eq!(outcome, Reachability::GaveUp { attempts: 2 });
    }

    #[tokio::test]
    async fn cancelled_gate_returns_promptly() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = NetworkGate::default()
            .with_cancellation(cancel)
            .wait_for_network("https://unreachable.invalid:6400")
            .await;
        assert_eq!(outcome, Reachability::Cancelled);
    }

    #[tokio::test]
    async fn ipv6_only_skips_ipv4_addresses() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let outcome = fast_gate()
            .with_family(AddressFamily::V6)
            .with_max_attempts(1)
            .wait_for_network(&format!("http://{addr}"))
            .await;
        assert_eq!(outcome, Reachability::GaveUp { attempts: 1 });
    }

    #[tokio::test]
    async fn unparsable_url_is_skipped() {
        let outcome = NetworkGate::default().wait_for_network("::nope").await;
        assert!(matches!(outcome, Reachability::Skipped { .. }));
    }
}
