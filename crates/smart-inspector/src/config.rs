//! Inspector configuration.
//!
//! Configuration is read from an optional TOML file and overridden by
//! `SMART_INSPECTOR__*` environment variables, e.g.
//! `SMART_INSPECTOR__COUNTDOWN_TICK=5s` or
//! `SMART_INSPECTOR__STORAGE__BACKEND=memory`.
//!
//! # Example (TOML)
//!
//! ```toml
//! countdown_tick = "10s"
//! http_timeout = "30s"
//! log_level = "info"
//!
//! [storage]
//! backend = "file"
//! directory = "/tmp/smart-inspector"
//! session_id = "default"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::countdown::DEFAULT_TICK;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InspectorConfig {
    /// How often live countdowns re-render.
    #[serde(with = "humantime_serde")]
    pub countdown_tick: Duration,

    /// Timeout for requests made by the HTTP SMART client.
    #[serde(with = "humantime_serde")]
    pub http_timeout: Duration,

    /// Default log filter when `RUST_LOG` is not set.
    pub log_level: String,

    /// Session storage settings.
    pub storage: StorageConfig,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            countdown_tick: DEFAULT_TICK,
            http_timeout: Duration::from_secs(30),
            log_level: "warn".to_string(),
            storage: StorageConfig::default(),
        }
    }
}

/// Where session-scoped values are kept.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Directory for the file backend. Defaults to `~/.smart-inspector`.
    pub directory: Option<PathBuf>,

    /// Session identifier; one file per session.
    pub session_id: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            directory: None,
            session_id: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    File,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// The configuration sources could not be read or merged.
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl InspectorConfig {
    /// Loads configuration from `path` (if it exists) and the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a source cannot be parsed or the merged
    /// configuration fails [`validate`](Self::validate).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(p) = path
            && p.exists()
        {
            builder = builder.add_source(File::from(p.to_path_buf()));
        }
        builder = builder.add_source(
            Environment::with_prefix("SMART_INSPECTOR")
                .try_parsing(true)
                .separator("__"),
        );

        let merged: Self = builder
            .build()
            .and_then(|c| c.try_deserialize::<Self>())
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        merged.validate()?;
        Ok(merged)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The countdown tick or HTTP timeout is zero
    /// - The session id is empty or contains a path separator
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.countdown_tick.is_zero() {
            return Err(ConfigError::InvalidValue(
                "countdown_tick must be greater than zero".to_string(),
            ));
        }

        if self.http_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "http_timeout must be greater than zero".to_string(),
            ));
        }

        let id = &self.storage.session_id;
        if id.is_empty() || id.contains(['/', '\\']) {
            return Err(ConfigError::InvalidValue(format!(
                "storage.session_id '{id}' must be a non-empty file name"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = InspectorConfig::default();
        assert_eq!(cfg.countdown_tick, Duration::from_secs(10));
        assert_eq!(cfg.storage.backend, StorageBackend::File);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = InspectorConfig {
            countdown_tick: Duration::ZERO,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        cfg.countdown_tick = Duration::from_secs(1);
        cfg.storage.session_id = "../escape".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
countdown_tick = "5s"

[storage]
backend = "memory"
session_id = "tab-42"
"#
        )
        .unwrap();

        let cfg = InspectorConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.countdown_tick, Duration::from_secs(5));
        assert_eq!(cfg.http_timeout, Duration::from_secs(30));
        assert_eq!(cfg.storage.backend, StorageBackend::Memory);
        assert_eq!(cfg.storage.session_id, "tab-42");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let cfg = InspectorConfig::load(Some(Path::new("/nonexistent/inspector.toml"))).unwrap();
        assert_eq!(cfg.storage.session_id, "default");
    }
}
