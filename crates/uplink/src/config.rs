//! Flag overrides on top of the layered settings.
//!
//! `uplink_config` produces defaults, file, and environment values; this
//! module lays the flags that were actually given over the result.

use uplink_core::RawConfig;

use crate::cli::Cli;
use crate::error::CliError;

/// Load settings and apply command-line overrides.
pub fn resolve(cli: &Cli) -> Result<RawConfig, CliError> {
    let mut raw = uplink_config::load_raw_config(cli.config.as_deref())?;
    apply_overrides(cli, &mut raw);
    Ok(raw)
}

fn apply_overrides(cli: &Cli, raw: &mut RawConfig) {
    fn set<T: Clone>(target: &mut T, flag: Option<&T>) {
        if let Some(value) = flag {
            target.clone_from(value);
        }
    }

    let device = &cli.device;
    set(&mut raw.hardware_model, device.model.as_ref());
    set(&mut raw.hardware_serial_number, device.serial_number.as_ref());
    set(&mut raw.hardware_manufacturer, device.manufacturer.as_ref());
    set(&mut raw.hardware_mac, device.mac.as_ref());
    set(&mut raw.hardware_last_reboot_reason, device.last_reboot_reason.as_ref());
    set(&mut raw.firmware_name, device.firmware_name.as_ref());
    set(&mut raw.boot_time, device.boot_time.as_ref());
    set(&mut raw.partner_id, device.partner_id.as_ref());

    let upstream = &cli.upstream;
    set(&mut raw.url, upstream.url.as_ref());
    set(&mut raw.max_backoff, upstream.max_backoff.as_ref());
    set(&mut raw.ping_timeout, upstream.ping_timeout.as_ref());
    set(&mut raw.interface, upstream.interface.as_ref());
    set(&mut raw.local_url, upstream.local_url.as_ref());
    set(&mut raw.protocol, upstream.protocol.as_ref());
    raw.force_ipv4 |= upstream.force_ipv4;
    raw.force_ipv6 |= upstream.force_ipv6;

    let security = &cli.security;
    set(&mut raw.auth_token_url, security.token_server_url.as_ref());
    set(&mut raw.mtls_client_cert_path, security.mtls_client_cert_path.as_ref());
    set(&mut raw.mtls_client_key_path, security.mtls_client_key_path.as_ref());
    set(&mut raw.cert_path, security.cert_path.as_ref());
    set(&mut raw.client_cert_path, security.client_cert_path.as_ref());
    set(&mut raw.reuse_mtls_for_session, security.reuse_mtls_for_session.as_ref());

    raw.debug |= cli.debug;
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn only_given_flags_override() {
        let cli = Cli::parse_from([
            "uplink",
            "-m",
            "X1",
            "--hw-mac",
            "AA-BB-CC-DD-EE-FF",
            "-4",
            "--reuse-mtls-for-session",
            "false",
        ]);
        let mut raw = RawConfig {
            hardware_serial_number: "from-file".into(),
            ..RawConfig::default()
        };
        apply_overrides(&cli, &mut raw);

        assert_eq!(raw.hardware_model, "X1");
        assert_eq!(raw.hardware_mac, "AA-BB-CC-DD-EE-FF");
        assert_eq!(raw.hardware_serial_number, "from-file");
        assert_eq!(raw.interface, "eth0");
        assert!(raw.force_ipv4);
        assert!(!raw.force_ipv6);
        assert!(!raw.reuse_mtls_for_session);
    }

    #[test]
    fn empty_flag_value_clears_setting() {
        let cli = Cli::parse_from(["uplink", "--hw-model", ""]);
        let mut raw = RawConfig::default();
        apply_overrides(&cli, &mut raw);
        assert!(raw.hardware_model.is_empty());
    }
}
