// ── Core error types ──
//
// Bootstrap errors, one variant per failure stage. Validation errors are
// fatal and raised before any network activity; credential and token
// errors are degradable; client construction is the single fatal stage
// after validation.

use thiserror::Error;

use crate::supervisor::SupervisorState;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Validation ───────────────────────────────────────────────────
    #[error("{field} must be set")]
    MissingField { field: &'static str },

    #[error("bad mac address: {mac}")]
    MalformedMac { mac: String },

    // ── Degradable stages ────────────────────────────────────────────
    #[error("failed to load mTLS config: {0}")]
    CredentialLoad(#[source] uplink_api::Error),

    #[error("failed to get token: {0}")]
    TokenFetch(#[source] uplink_api::Error),

    // ── Fatal stages ─────────────────────────────────────────────────
    #[error("failed to create upstream client: {0}")]
    ClientConstruction(#[source] uplink_api::Error),

    #[error("failed to close upstream client: {0}")]
    Shutdown(#[source] uplink_api::Error),

    // ── Sequencing ───────────────────────────────────────────────────
    #[error("bootstrap already ran (supervisor is {state})")]
    AlreadyStarted { state: SupervisorState },
}

impl CoreError {
    /// Returns `true` for configuration errors caught by validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::MissingField { .. } | Self::MalformedMac { .. })
    }

    /// Returns `true` if bootstrap carries on past this error.
    pub fn is_degradable(&self) -> bool {
        matches!(self, Self::CredentialLoad(_) | Self::TokenFetch(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let missing = CoreError::MissingField { field: "hw-model" };
        assert!(missing.is_validation());
        assert!(!missing.is_degradable());
        assert_eq!(missing.to_string(), "hw-model must be set");

        let token = CoreError::TokenFetch(uplink_api::Error::SessionClosed);
        assert!(token.is_degradable());
        assert!(!token.is_validation());

        let fatal = CoreError::ClientConstruction(uplink_api::Error::UpstreamSetup("x".into()));
        assert!(!fatal.is_degradable());
        assert!(!fatal.is_validation());

        let again = CoreError::AlreadyStarted {
            state: SupervisorState::Active,
        };
        assert!(!again.is_degradable());
        assert_eq!(again.to_string(), "bootstrap already ran (supervisor is active)");
    }
}
