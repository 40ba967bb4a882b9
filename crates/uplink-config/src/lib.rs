//! Configuration loading for the uplink agent.
//!
//! Builds a `uplink_core::RawConfig` from built-in defaults, an optional
//! TOML file, and `UPLINK_*` environment variables, in that order of
//! precedence. Command-line overrides are applied on top by the binary.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
    value::Value,
};
use thiserror::Error;

use uplink_core::RawConfig;

/// Prefix for environment overrides, e.g. `UPLINK_HARDWARE_MODEL`.
pub const ENV_PREFIX: &str = "UPLINK_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Default settings file, following platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "uplink", "uplink").map_or_else(
        || PathBuf::from("/etc/uplink/config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Loading ─────────────────────────────────────────────────────────

/// The provider stack, exposed so callers can inspect or extend it.
///
/// Environment values are type-guessed by figment, so `001122334455`
/// would arrive as a number. Settings whose default is text are merged
/// again from the unparsed variable so they load exactly as written.
pub fn layered(path: &Path) -> Figment {
    let defaults = Figment::from(Serialized::defaults(RawConfig::default()));
    let mut figment = defaults
        .clone()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX));

    for (key, value) in Env::prefixed(ENV_PREFIX).iter() {
        let key = key.as_str().to_ascii_lowercase();
        if matches!(defaults.find_value(&key), Ok(Value::String(..))) {
            figment = figment.merge(Serialized::default(&key, value));
        }
    }
    figment
}

/// Load raw configuration. A missing file is not an error.
pub fn load_raw_config(path: Option<&Path>) -> Result<RawConfig, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    let raw: RawConfig = layered(&path).extract()?;
    Ok(raw)
}

/// Render a config as TOML, suitable for a settings file.
pub fn render_config(raw: &RawConfig) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(raw)?)
}
