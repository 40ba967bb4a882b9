// ── Device configuration ──
//
// `RawConfig` is what the configuration provider hands in: flag, file,
// and environment values with defaults filled in, not yet checked.
// `Config` is the validated, immutable result of `identity::validate`.
// Core never reads files or flags itself.

use serde::{Deserialize, Serialize};

use crate::identity::{DeviceId, MacAddress};

/// Path appended to the configured upstream base URL.
pub const UPSTREAM_PATH: &str = "/api/v2/device";

/// Flag-style key names, used in validation messages.
pub mod keys {
    pub const HARDWARE_MODEL: &str = "hw-model";
    pub const HARDWARE_SERIAL_NUMBER: &str = "hw-serial-number";
    pub const HARDWARE_MANUFACTURER: &str = "hw-manufacturer";
    pub const HARDWARE_MAC: &str = "hw-mac";
    pub const URL: &str = "webpa-url";
}

// ── RawConfig ───────────────────────────────────────────────────────

/// Unvalidated configuration as assembled by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub hardware_model: String,
    pub hardware_serial_number: String,
    pub hardware_manufacturer: String,
    pub hardware_mac: String,
    pub hardware_last_reboot_reason: String,
    pub firmware_name: String,
    /// Boot time in unix seconds.
    pub boot_time: i64,
    /// Upstream base URL, without the device path.
    pub url: String,
    /// Reconnect backoff ceiling in seconds.
    pub max_backoff: u64,
    /// Seconds to wait between pings before the upstream counts as broken.
    pub ping_timeout: u64,
    pub interface: String,
    pub local_url: String,
    pub partner_id: String,
    /// Legacy single certificate path, not used by the token exchange.
    pub cert_path: String,
    pub auth_token_url: String,
    pub force_ipv4: bool,
    pub force_ipv6: bool,
    /// Legacy client certificate path, not used by the token exchange.
    pub client_cert_path: String,
    pub mtls_client_key_path: String,
    pub mtls_client_cert_path: String,
    /// Sent verbatim as the token request's protocol header.
    pub protocol: String,
    /// Hand the mTLS identity to the upstream session as well as the
    /// token exchange.
    pub reuse_mtls_for_session: bool,
    pub debug: bool,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            hardware_model: "RPI-RDKB".into(),
            hardware_serial_number: "0000000000000000".into(),
            hardware_manufacturer: "Raspberry".into(),
            hardware_mac: "11:22:33:44:55:66".into(),
            hardware_last_reboot_reason: "unknown".into(),
            firmware_name: "unknown".into(),
            boot_time: chrono::Utc::now().timestamp(),
            url: "https://petasos:6400".into(),
            max_backoff: 60,
            ping_timeout: 180,
            interface: "eth0".into(),
            local_url: "tcp://127.0.0.1:6666".into(),
            partner_id: "comcast".into(),
            cert_path: String::new(),
            auth_token_url: "https://themis:6501/issue".into(),
            force_ipv4: false,
            force_ipv6: false,
            client_cert_path: String::new(),
            mtls_client_key_path: String::new(),
            mtls_client_cert_path: String::new(),
            protocol: String::new(),
            reuse_mtls_for_session: true,
            debug: false,
        }
    }
}

// ── Config ──────────────────────────────────────────────────────────

/// Validated device configuration.
///
/// Only `identity::validate` builds one, so every `Config` in circulation
/// has a non-empty model, serial, manufacturer and URL plus a MAC that
/// passed the syntax check.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Config {
    // Identity
    pub hardware_model: String,
    pub hardware_serial_number: String,
    pub hardware_manufacturer: String,
    pub hardware_mac: MacAddress,
    pub hardware_last_reboot_reason: String,
    pub firmware_name: String,
    pub boot_time: i64,
    pub partner_id: String,
    pub device_id: DeviceId,

    // Connectivity
    /// Upstream URL including [`UPSTREAM_PATH`].
    pub url: String,
    pub interface: String,
    pub force_ipv4: bool,
    pub force_ipv6: bool,
    pub ping_timeout: u64,
    pub max_backoff: u64,
    pub local_url: String,
    pub protocol: String,

    // Security
    pub mtls_client_cert_path: String,
    pub mtls_client_key_path: String,
    pub auth_token_url: String,
    pub cert_path: String,
    pub client_cert_path: String,
    pub reuse_mtls_for_session: bool,

    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let raw = RawConfig::default();
        assert_eq!(raw.interface, "eth0");
        assert_eq!(raw.ping_timeout, 180);
        assert_eq!(raw.max_backoff, 60);
        assert_eq!(raw.partner_id, "comcast");
        assert_eq!(raw.url, "https://petasos:6400");
        assert_eq!(raw.auth_token_url, "https://themis:6501/issue");
        assert!(raw.reuse_mtls_for_session);
        assert!(raw.protocol.is_empty());
        assert!(raw.boot_time > 0);
    }
}
