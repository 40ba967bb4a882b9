//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with help
//! text and a process exit code.

use miette::Diagnostic;
use thiserror::Error;

use uplink_config::ConfigError;
use uplink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const CONFIG: i32 = 2;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────

    #[error("{field} must be set")]
    #[diagnostic(
        code(uplink::missing_field),
        help("Pass --{field}, set it in the settings file, or export the matching UPLINK_* variable.")
    )]
    MissingField { field: &'static str },

    #[error("bad mac address: {mac}")]
    #[diagnostic(
        code(uplink::malformed_mac),
        help("Use six hex pairs (aa:bb:cc:dd:ee:ff or aa-bb-cc-dd-ee-ff) or three hex quads (aabb.ccdd.eeff).")
    )]
    MalformedMac { mac: String },

    #[error(transparent)]
    #[diagnostic(
        code(uplink::config),
        help("Check the settings file and UPLINK_* environment variables.")
    )]
    Config(#[from] ConfigError),

    // ── Session ──────────────────────────────────────────────────────

    #[error("Could not start the upstream session")]
    #[diagnostic(
        code(uplink::upstream),
        help("Check --webpa-url and that the upstream endpoint accepts this device.")
    )]
    Upstream {
        #[source]
        source: CoreError,
    },

    #[error("Shutdown did not complete cleanly")]
    #[diagnostic(code(uplink::shutdown))]
    Shutdown {
        #[source]
        source: CoreError,
    },

    // ── IO ───────────────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(code(uplink::io))]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingField { .. } | Self::MalformedMac { .. } | Self::Config(_) => {
                exit_code::CONFIG
            }
            Self::Upstream { .. } => exit_code::CONNECTION,
            Self::Shutdown { .. } | Self::Io(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MissingField { field } => Self::MissingField { field },
            CoreError::MalformedMac { mac } => Self::MalformedMac { mac },
            CoreError::Shutdown(_) => Self::Shutdown { source: err },
            other => Self::Upstream { source: other },
        }
    }
}

#[cfg(test)]
mod tests {
    use uplink_core::ApiError;

    use super::*;

    #[test]
    fn validation_errors_exit_with_config_code() {
        let err = CliError::from(CoreError::MalformedMac { mac: "zz".into() });
        assert_eq!(err.exit_code(), exit_code::CONFIG);
        assert_eq!(err.to_string(), "bad mac address: zz");

        let err = CliError::from(CoreError::MissingField { field: "hw-model" });
        assert_eq!(err.exit_code(), exit_code::CONFIG);
    }

    #[test]
    fn construction_failure_is_a_connection_error() {
        let err = CliError::from(CoreError::ClientConstruction(ApiError::SessionClosed));
        assert_eq!(err.exit_code(), exit_code::CONNECTION);
    }
}
