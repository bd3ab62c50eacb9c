//! Configuration management
//!
//! Configuration is read once at startup from a TOML file and passed into
//! each component as an immutable value. A missing or malformed file falls
//! back to defaults with a logged warning; a change requires a restart.

use crate::error::ConfigError;
use log::{error, info, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Metrics poll loop settings
    pub metrics: MetricsConfig,
    /// Database credentials for the persistence sink
    pub database: DatabaseConfig,
    /// Login tail loop settings
    pub auth_log: AuthLogConfig,
}

/// Settings for the metrics poll loop
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds to sleep between poll ticks
    pub polling_interval: u64,
    /// External host probed for round-trip latency each tick
    pub external_probe_host: String,
    /// Number of echo requests per latency probe
    pub probe_count: u32,
    /// Per-probe timeout in seconds
    pub probe_timeout_secs: u64,
    /// IP-echo service queried for the externally visible address
    pub ip_echo_url: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            polling_interval: 300,
            external_probe_host: "8.8.8.8".to_string(),
            probe_count: 2,
            probe_timeout_secs: 2,
            ip_echo_url: "https://api.ipify.org".to_string(),
        }
    }
}

/// Database credentials for the persistence sink
///
/// Each write opens its own short-lived connection from these values.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub dbname: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            user: "secsuite".to_string(),
            password: String::new(),
            host: "localhost".to_string(),
            port: 5432,
            dbname: "secsuite".to_string(),
        }
    }
}

/// Settings for the login tail loop
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthLogConfig {
    /// Path of the append-only authentication log to tail
    pub path: PathBuf,
}

impl Default for AuthLogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/log/auth.log"),
        }
    }
}

impl Config {
    /// Parse configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read and
    /// `ConfigError::TomlError` if it does not parse.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from an optional file path, falling back to defaults
    ///
    /// A missing or unreadable file and a file that fails to parse both fall
    /// back to the default configuration; only the kind of warning differs.
    pub fn load(path: Option<&str>) -> Self {
        match path {
            Some(path) => {
                info!("Loading configuration from: {}", path);
                match Self::from_file(Path::new(path)) {
                    Ok(config) => config,
                    Err(ConfigError::ReadError(e)) => {
                        warn!("Configuration file not readable ({}), using defaults", e);
                        Self::default()
                    }
                    Err(e) => {
                        error!("Configuration error in '{}': {}", path, e);
                        warn!("Using default configuration due to invalid config file");
                        Self::default()
                    }
                }
            }
            None => {
                info!("Using default configuration");
                Self::default()
            }
        }
    }

    /// Validate the settings no loop can run without
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for values the defaults can
    /// never produce but an explicit config file can: a zero poll interval,
    /// an empty database host or an empty database user. These are fatal at
    /// startup, before any loop is spawned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.metrics.polling_interval == 0 {
            return Err(ConfigError::ValidationError(
                "metrics.polling_interval must be at least 1 second".to_string(),
            ));
        }
        if self.metrics.probe_count == 0 {
            return Err(ConfigError::ValidationError(
                "metrics.probe_count must be at least 1".to_string(),
            ));
        }
        if self.database.host.is_empty() {
            return Err(ConfigError::ValidationError(
                "database.host must not be empty".to_string(),
            ));
        }
        if self.database.user.is_empty() {
            return Err(ConfigError::ValidationError(
                "database.user must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.metrics.polling_interval, 300);
        assert_eq!(config.metrics.external_probe_host, "8.8.8.8");
        assert_eq!(config.metrics.probe_count, 2);
        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.database.dbname, "secsuite");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.auth_log.path, PathBuf::from("/var/log/auth.log"));
    }

    #[test]
    fn test_from_file_overrides_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[metrics]
polling_interval = 60

[database]
user = "monitor"
password = "hunter2"
host = "db.internal"

[auth_log]
path = "/var/log/secure"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.metrics.polling_interval, 60);
        // Unset keys keep their defaults
        assert_eq!(config.metrics.probe_count, 2);
        assert_eq!(config.database.user, "monitor");
        assert_eq!(config.database.password, "hunter2");
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.dbname, "secsuite");
        assert_eq!(config.auth_log.path, PathBuf::from("/var/log/secure"));
    }

    #[test]
    fn test_from_file_missing_file() {
        let result = Config::from_file(Path::new("/nonexistent/vigil.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }

    #[test]
    fn test_from_file_malformed_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is not toml [[").unwrap();

        let result = Config::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_load_falls_back_to_defaults() {
        // Missing file
        let config = Config::load(Some("/nonexistent/vigil.toml"));
        assert_eq!(config, Config::default());

        // Malformed file
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{ not toml").unwrap();
        let config = Config::load(file.path().to_str());
        assert_eq!(config, Config::default());

        // No path at all
        let config = Config::load(None);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.metrics.polling_interval = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_database_fields() {
        let mut config = Config::default();
        config.database.host = String::new();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.database.user = String::new();
        assert!(config.validate().is_err());
    }
}
