//! Config file loading, env overrides, validation.

use std::path::Path;

use tracing::{debug, info};

use crate::types::Config;

/// Errors from configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`Config`].
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Path that failed.
        path: String,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load configuration from an optional TOML file plus env overrides.
///
/// A missing file is not an error: defaults apply. Recognized
/// environment overrides (applied after the file):
///
/// - `TRELLIS_BIND` → `gateway.bind`
/// - `TRELLIS_STORE_PATH` → `store.path`
/// - `TRELLIS_LOG` → `logging.level`
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file exists but cannot be read or
/// parsed, or if the merged configuration fails validation.
pub fn load(path: Option<&Path>) -> ConfigResult<Config> {
    let mut config = match path {
        Some(path) if path.exists() => {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            let config = parse(&raw, &path.display().to_string())?;
            info!(path = %path.display(), "loaded configuration");
            config
        },
        Some(path) => {
            debug!(path = %path.display(), "config file not found, using defaults");
            Config::default()
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config);
    validate(&config)?;
    Ok(config)
}

/// Parse configuration from a TOML string (no env overrides).
///
/// # Errors
///
/// Returns a [`ConfigError`] on parse or validation failure.
pub fn load_from_str(raw: &str) -> ConfigResult<Config> {
    let config = parse(raw, "<inline>")?;
    validate(&config)?;
    Ok(config)
}

fn parse(raw: &str, path: &str) -> ConfigResult<Config> {
    toml::from_str(raw).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(bind) = std::env::var("TRELLIS_BIND")
        && !bind.is_empty()
    {
        config.gateway.bind = bind;
    }
    if let Ok(path) = std::env::var("TRELLIS_STORE_PATH") {
        config.store.path = path;
    }
    if let Ok(level) = std::env::var("TRELLIS_LOG")
        && !level.is_empty()
    {
        config.logging.level = level;
    }
}

fn validate(config: &Config) -> ConfigResult<()> {
    if config.engine.broadcast_debounce_ms == 0 {
        return Err(ConfigError::Invalid(
            "engine.broadcast_debounce_ms must be positive".to_owned(),
        ));
    }
    if config.engine.sync_debounce_ms == 0 {
        return Err(ConfigError::Invalid(
            "engine.sync_debounce_ms must be positive".to_owned(),
        ));
    }
    if config.engine.sync_retry.jitter_pct > 100 {
        return Err(ConfigError::Invalid(
            "engine.sync_retry.jitter_pct must be at most 100".to_owned(),
        ));
    }
    if config.engine.sync_retry.initial_ms > config.engine.sync_retry.max_ms {
        return Err(ConfigError::Invalid(
            "engine.sync_retry.initial_ms must not exceed max_ms".to_owned(),
        ));
    }
    if config.gateway.ping_interval_ms >= config.gateway.ping_timeout_ms {
        return Err(ConfigError::Invalid(
            "gateway.ping_interval_ms must be below ping_timeout_ms".to_owned(),
        ));
    }
    if config.logging.format != "pretty" && config.logging.format != "json" {
        return Err(ConfigError::Invalid(format!(
            "logging.format must be \"pretty\" or \"json\", got {:?}",
            config.logging.format
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.engine.broadcast_debounce_ms, 500);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trellis.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "[engine]\nsync_debounce_ms = 5000").unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.engine.sync_debounce_ms, 5_000);
        assert_eq!(config.engine.broadcast_debounce_ms, 500);
    }

    #[test]
    fn zero_debounce_is_rejected() {
        let err = load_from_str("[engine]\nbroadcast_debounce_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn ping_interval_must_be_below_timeout() {
        let err =
            load_from_str("[gateway]\nping_interval_ms = 60000\nping_timeout_ms = 60000\n")
                .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_format_is_rejected() {
        let err = load_from_str("[logging]\nformat = \"xml\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
