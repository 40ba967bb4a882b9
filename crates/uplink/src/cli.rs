//! Clap derive structures for the `uplink` binary.
//!
//! Every device setting is optional here: a flag only overrides the
//! settings file and environment when it is actually given.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// uplink -- device agent for the upstream message-routing service
#[derive(Debug, Parser)]
#[command(
    name = "uplink",
    version,
    about = "Bootstrap device identity and hold the upstream session open",
    long_about = "Validates the device identity, waits for the network, loads the mTLS\n\
        client identity, exchanges it for a bearer token, and opens the\n\
        long-lived upstream session. Runs until interrupted."
)]
pub struct Cli {
    /// Settings file (TOML). Defaults to the platform config directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub device: DeviceOpts,

    #[command(flatten)]
    pub upstream: UpstreamOpts,

    #[command(flatten)]
    pub security: SecurityOpts,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Increase verbosity (-v, -vv). Version is `-V` / `--version`.
    #[arg(long, short = 'v', action = ArgAction::Count)]
    pub verbose: u8,
}

// ── Device identity ──────────────────────────────────────────────────

#[derive(Debug, Args)]
#[command(next_help_heading = "Device identity")]
pub struct DeviceOpts {
    /// Hardware model name [default: RPI-RDKB]
    #[arg(long = "hw-model", short = 'm', value_name = "MODEL")]
    pub model: Option<String>,

    /// Hardware serial number [default: 0000000000000000]
    #[arg(long = "hw-serial-number", short = 's', value_name = "SERIAL")]
    pub serial_number: Option<String>,

    /// Hardware manufacturer [default: Raspberry]
    #[arg(long = "hw-manufacturer", short = 'f', value_name = "NAME")]
    pub manufacturer: Option<String>,

    /// Hardware MAC address [default: 11:22:33:44:55:66]
    #[arg(long = "hw-mac", short = 'd', value_name = "MAC")]
    pub mac: Option<String>,

    /// Reason for the last reboot [default: unknown]
    #[arg(long = "hw-last-reboot-reason", short = 'r', value_name = "REASON")]
    pub last_reboot_reason: Option<String>,

    /// Firmware name [default: unknown]
    #[arg(long = "fw-name", short = 'n', value_name = "NAME")]
    pub firmware_name: Option<String>,

    /// Boot time in unix seconds [default: now]
    #[arg(long = "boot-time", short = 'b', value_name = "SECS")]
    pub boot_time: Option<i64>,

    /// Partner id [default: comcast]
    #[arg(long = "partner-id", short = 'p', value_name = "ID")]
    pub partner_id: Option<String>,
}

// ── Upstream ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
#[command(next_help_heading = "Upstream")]
pub struct UpstreamOpts {
    /// Upstream base URL [default: https://petasos:6400]
    #[arg(long = "webpa-url", short = 'u', value_name = "URL")]
    pub url: Option<String>,

    /// Maximum reconnect backoff in seconds [default: 60]
    #[arg(long = "webpa-backoff-max", short = 'o', value_name = "SECS")]
    pub max_backoff: Option<u64>,

    /// Ping wait in seconds before the session counts as broken [default: 180]
    #[arg(long = "webpa-ping-timeout", short = 't', value_name = "SECS")]
    pub ping_timeout: Option<u64>,

    /// Network interface in use [default: eth0]
    #[arg(long = "webpa-interface-used", short = 'i', value_name = "IFACE")]
    pub interface: Option<String>,

    /// Local service URL [default: tcp://127.0.0.1:6666]
    #[arg(long = "parodus-local-url", short = 'l', value_name = "URL")]
    pub local_url: Option<String>,

    /// Only try IPv4 addresses of the upstream host
    #[arg(long = "force-ipv4", short = '4')]
    pub force_ipv4: bool,

    /// Only try IPv6 addresses of the upstream host
    #[arg(long = "force-ipv6", short = '6')]
    pub force_ipv6: bool,

    /// Protocol identifier sent with the token request
    #[arg(long, value_name = "PROTOCOL")]
    pub protocol: Option<String>,
}

// ── Security ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
#[command(next_help_heading = "Security")]
pub struct SecurityOpts {
    /// Token issuance URL [default: https://themis:6501/issue]
    #[arg(long = "token-server-url", short = 'U', value_name = "URL")]
    pub token_server_url: Option<String>,

    /// mTLS client certificate (PEM)
    #[arg(long = "mtls-client-cert-path", short = 'M', value_name = "PATH")]
    pub mtls_client_cert_path: Option<String>,

    /// mTLS client private key (PEM)
    #[arg(long = "mtls-client-key-path", short = 'K', value_name = "PATH")]
    pub mtls_client_key_path: Option<String>,

    /// Legacy certificate path
    #[arg(long = "ssl-cert-path", short = 'c', value_name = "PATH")]
    pub cert_path: Option<String>,

    /// Legacy client certificate path
    #[arg(long = "client-cert-path", short = 'P', value_name = "PATH")]
    pub client_cert_path: Option<String>,

    /// Use the mTLS identity for the upstream session too [default: true]
    #[arg(long = "reuse-mtls-for-session", value_name = "BOOL")]
    pub reuse_mtls_for_session: Option<bool>,
}
