// ── Device identity ──
//
// MAC canonicalization, the derived device id, and the single validation
// step that turns a `RawConfig` into a `Config`.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{Config, RawConfig, UPSTREAM_PATH, keys};
use crate::error::CoreError;

// Unanchored: a MAC-shaped substring anywhere in the input is enough.
static MAC_SEARCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(([0-9A-Fa-f]{2}[:-]?){5}[0-9A-Fa-f]{2})|(([0-9A-Fa-f]{4}\.){2}[0-9A-Fa-f]{4})")
        .unwrap_or_else(|_| unreachable!("static pattern"))
});

static MAC_EXACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:[0-9a-f]{2}[:-]?){5}[0-9a-f]{2}|(?:[0-9a-f]{4}\.){2}[0-9a-f]{4})$")
        .unwrap_or_else(|_| unreachable!("static pattern"))
});

/// Returns `true` if `s` contains a colon-, dash-, or dot-delimited MAC
/// address (or twelve bare hex digits) anywhere in it.
pub fn is_valid_mac(s: &str) -> bool {
    MAC_SEARCH.is_match(s)
}

// ── MacAddress ──────────────────────────────────────────────────────

/// MAC address, lower-cased. A bare address in any delimiter style is
/// rewritten to `aa:bb:cc:dd:ee:ff`; anything else is kept as given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacAddress(String);

impl MacAddress {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let lower = raw.as_ref().trim().to_lowercase();
        if !MAC_EXACT.is_match(&lower) {
            return Self(lower);
        }

        let digits: Vec<char> = lower.chars().filter(char::is_ascii_hexdigit).collect();
        let octets: Vec<String> = digits.chunks(2).map(|pair| pair.iter().collect()).collect();
        Self(octets.join(":"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MacAddress {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

// ── DeviceId ────────────────────────────────────────────────────────

/// Canonical device identity: `mac:` followed by the MAC without colons.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&MacAddress> for DeviceId {
    fn from(mac: &MacAddress) -> Self {
        Self(format!("mac:{}", mac.as_str().replace(':', "")))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Validation ──────────────────────────────────────────────────────

/// Validate raw configuration and derive the device identity.
///
/// Checks run in a fixed order (model, serial, manufacturer, MAC syntax,
/// URL) and the first failure wins. No I/O happens here.
pub fn validate(raw: &RawConfig) -> Result<Config, CoreError> {
    require(&raw.hardware_model, keys::HARDWARE_MODEL)?;
    require(&raw.hardware_serial_number, keys::HARDWARE_SERIAL_NUMBER)?;
    require(&raw.hardware_manufacturer, keys::HARDWARE_MANUFACTURER)?;

    let mac = MacAddress::new(&raw.hardware_mac);
    if !is_valid_mac(mac.as_str()) {
        return Err(CoreError::MalformedMac {
            mac: raw.hardware_mac.clone(),
        });
    }

    require(&raw.url, keys::URL)?;

    let device_id = DeviceId::from(&mac);
    let url = upstream_url(&raw.url);
    debug!(device_id = %device_id, url = %url, "configuration validated");

    Ok(Config {
        hardware_model: raw.hardware_model.clone(),
        hardware_serial_number: raw.hardware_serial_number.clone(),
        hardware_manufacturer: raw.hardware_manufacturer.clone(),
        hardware_mac: mac,
        hardware_last_reboot_reason: raw.hardware_last_reboot_reason.clone(),
        firmware_name: raw.firmware_name.clone(),
        boot_time: raw.boot_time,
        partner_id: raw.partner_id.clone(),
        device_id,
        url,
        interface: raw.interface.clone(),
        force_ipv4: raw.force_ipv4,
        force_ipv6: raw.force_ipv6,
        ping_timeout: raw.ping_timeout,
        max_backoff: raw.max_backoff,
        local_url: raw.local_url.clone(),
        protocol: raw.protocol.clone(),
        mtls_client_cert_path: raw.mtls_client_cert_path.clone(),
        mtls_client_key_path: raw.mtls_client_key_path.clone(),
        auth_token_url: raw.auth_token_url.clone(),
        cert_path: raw.cert_path.clone(),
        client_cert_path: raw.client_cert_path.clone(),
        reuse_mtls_for_session: raw.reuse_mtls_for_session,
        debug: raw.debug,
    })
}

fn require(value: &str, field: &'static str) -> Result<(), CoreError> {
    if value.is_empty() {
        Err(CoreError::MissingField { field })
    } else {
        Ok(())
    }
}

/// Join the base URL and [`UPSTREAM_PATH`].
///
/// Trailing slashes on the base are dropped and a base that already ends
/// in the device path is kept as is, so `https://host/` and
/// `https://host/api/v2/device` both yield `https://host/api/v2/device`.
/// This is a normalization, not a plain concatenation.
fn upstream_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with(UPSTREAM_PATH) {
        base.to_owned()
    } else {
        format!("{base}{UPSTREAM_PATH}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn raw() -> RawConfig {
        RawConfig {
            hardware_model: "X1".into(),
            hardware_serial_number: "S123".into(),
            hardware_manufacturer: "Acme".into(),
            hardware_mac: "AA:BB:CC:DD:EE:FF".into(),
            url: "https://host:1234".into(),
            ..RawConfig::default()
        }
    }

    #[test]
    fn end_to_end_identity() {
        let config = validate(&raw()).unwrap();
        assert_eq!(config.url, "https://host:1234/api/v2/device");
        assert_eq!(config.device_id.as_str(), "mac:aabbccddeeff");
        assert_eq!(config.hardware_mac.as_str(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn validation_is_deterministic() {
        let input = raw();
        assert_eq!(validate(&input).unwrap(), validate(&input).unwrap());
    }

    #[test]
    fn suffix_is_appended_once() {
        let mut input = raw();
        input.url = "https://host:1234/".into();
        assert_eq!(validate(&input).unwrap().url, "https://host:1234/api/v2/device");

        input.url = "https://host:1234/api/v2/device".into();
        assert_eq!(validate(&input).unwrap().url, "https://host:1234/api/v2/device");
    }

    #[test]
    fn model_is_checked_before_mac() {
        let mut input = raw();
        input.hardware_model = String::new();
        input.hardware_mac = "not a mac".into();
        assert!(matches!(
            validate(&input),
            Err(CoreError::MissingField { field: "hw-model" })
        ));
    }

    #[test]
    fn whitespace_only_fields_are_present() {
        let mut input = raw();
        input.hardware_model = " ".into();
        input.hardware_serial_number = "\t".into();
        let config = validate(&input).unwrap();
        assert_eq!(config.hardware_model, " ");
        assert_eq!(config.hardware_serial_number, "\t");
    }

    #[test]
    fn field_check_order() {
        let mut input = raw();
        input.hardware_serial_number = String::new();
        input.hardware_manufacturer = String::new();
        assert!(matches!(
            validate(&input),
            Err(CoreError::MissingField {
                field: "hw-serial-number"
            })
        ));

        input.hardware_serial_number = "S123".into();
        assert!(matches!(
            validate(&input),
            Err(CoreError::MissingField {
                field: "hw-manufacturer"
            })
        ));

        input.hardware_manufacturer = "Acme".into();
        input.hardware_mac = "zz".into();
        input.url = String::new();
        assert!(matches!(validate(&input), Err(CoreError::MalformedMac { .. })));

        input.hardware_mac = "aa:bb:cc:dd:ee:ff".into();
        assert!(matches!(
            validate(&input),
            Err(CoreError::MissingField { field: "webpa-url" })
        ));
    }

    #[test]
    fn device_id_ignores_delimiter_style() {
        for mac in ["AA-BB-CC-DD-EE-FF", "aabb.ccdd.eeff", "AABBCCDDEEFF", "aa:BB:cc:DD:ee:FF"] {
            let mut input = raw();
            input.hardware_mac = mac.into();
            let config = validate(&input).unwrap();
            assert_eq!(config.device_id.as_str(), "mac:aabbccddeeff", "input {mac}");
            assert_eq!(config.hardware_mac.as_str(), "aa:bb:cc:dd:ee:ff");
        }
    }

    #[test]
    fn mac_syntax() {
        assert!(is_valid_mac("11:22:33:44:55:66"));
        assert!(is_valid_mac("11-22-33-44-55-66"));
        assert!(is_valid_mac("aBcD.1234.EF56"));
        assert!(!is_valid_mac("11:22:33:44:55"));
        assert!(!is_valid_mac("gg:hh:ii:jj:kk:ll"));
        assert!(!is_valid_mac(""));
    }

    #[test]
    fn mac_match_is_a_substring_search() {
        assert!(is_valid_mac("eth0 11:22:33:44:55:66 (primary)"));
        assert!(is_valid_mac("mac=aabb.ccdd.eeff;"));

        // Decorated input is lower-cased but otherwise kept.
        let mac = MacAddress::new("Port-1 AA:BB:CC:DD:EE:FF");
        assert_eq!(mac.as_str(), "port-1 aa:bb:cc:dd:ee:ff");
        assert_eq!(DeviceId::from(&mac).as_str(), "mac:port-1 aabbccddeeff");
    }
}
