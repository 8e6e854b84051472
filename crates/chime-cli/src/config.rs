//! Chime CLI Configuration Management
//!
//! Configuration is layered with figment, lowest priority first:
//! - built-in defaults
//! - `~/.chime/config.toml`
//! - the file passed with `--config`
//! - `CHIME_` environment variables, with `__` separating nested keys
//!   (`CHIME_CLI__REPLAY_TIMEOUT_SECS=10`)

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use chime_core::ChimeConfig;

const CONFIG_DIR: &str = ".chime";
const CONFIG_FILE: &str = "config.toml";
const CREDENTIALS_FILE: &str = "credentials.toml";

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the `chime` binary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliAppConfig {
    /// Session core configuration
    pub core: ChimeConfig,

    /// CLI-specific configuration
    pub cli: CliConfig,
}

/// CLI-specific configuration options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Credentials file; defaults to `credentials.toml` in the data directory
    pub credentials_file: Option<PathBuf>,

    /// Upper bound on a whole `replay` run
    pub replay_timeout_secs: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            credentials_file: None,
            replay_timeout_secs: 30,
        }
    }
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Loading(String),

    #[error("Invalid configuration: {0}")]
    Validation(String),

    #[error("Environment error: {0}")]
    Environment(String),
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl CliAppConfig {
    /// Load the layered configuration and validate it
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        if let Some(home) = default_data_dir() {
            figment = figment.merge(Toml::file(home.join(CONFIG_FILE)));
        }

        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::Loading(format!(
                    "Configuration file {} does not exist",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        Self::from_figment(figment.merge(Env::prefixed("CHIME_").split("__")))
    }

    /// Load defaults overlaid with a single file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_figment(
            Figment::new()
                .merge(Serialized::defaults(Self::default()))
                .merge(Toml::file(path.as_ref())),
        )
    }

    fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: CliAppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.core.validate().map_err(ConfigError::Validation)?;

        if self.cli.replay_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "Replay timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve the credentials file
    ///
    /// `--data-dir` wins, then the configured `credentials_file`, then
    /// `~/.chime/credentials.toml`.
    pub fn credentials_path(&self, data_dir: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = data_dir {
            return Ok(dir.join(CREDENTIALS_FILE));
        }
        if let Some(path) = &self.cli.credentials_file {
            return Ok(path.clone());
        }

        default_data_dir()
            .map(|dir| dir.join(CREDENTIALS_FILE))
            .ok_or_else(|| ConfigError::Environment("Cannot determine the home directory".to_string()))
    }
}

/// `~/.chime`
fn default_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config_is_valid() {
        let config = CliAppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cli.replay_timeout_secs, 30);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chime.toml");
        std::fs::write(
            &path,
            r#"
            [cli]
            replay_timeout_secs = 5
            credentials_file = "/var/lib/chime/creds.toml"

            [core.retry]
            max_retries = 2
            "#,
        )
        .unwrap();

        let config = CliAppConfig::load_from_file(&path).unwrap();
        assert_eq!(config.cli.replay_timeout_secs, 5);
        assert_eq!(config.core.retry.max_retries, 2);
        // Untouched sections keep their defaults
        assert_eq!(
            config.core.session.connect_timeout,
            ChimeConfig::default().session.connect_timeout
        );
        assert_eq!(
            config.credentials_path(None).unwrap(),
            PathBuf::from("/var/lib/chime/creds.toml")
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chime.toml");
        std::fs::write(&path, "[cli]\nreplay_timeout_secs = 0\n").unwrap();
        assert!(matches!(
            CliAppConfig::load_from_file(&path),
            Err(ConfigError::Validation(_))
        ));

        let mut config = CliAppConfig::default();
        config.core.session.connect_timeout = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = CliAppConfig::load(Some(dir.path().join("absent.toml").as_path()));
        assert!(matches!(result, Err(ConfigError::Loading(_))));
    }

    #[test]
    fn test_credentials_path_uses_data_dir() {
        let config = CliAppConfig::default();
        let path = config
            .credentials_path(Some(Path::new("/tmp/chime-data")))
            .unwrap();
        assert_eq!(path, PathBuf::from("/tmp/chime-data/credentials.toml"));
    }
}
