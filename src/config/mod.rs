//! Configuration management for bundlebox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use bundlebox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `BUNDLEBOX__<section>__<key>`
//!
//! Examples:
//! - `BUNDLEBOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `BUNDLEBOX__ARCHIVE__MAX_ENTRY_BYTES=200MB`
//! - `BUNDLEBOX__ADMISSION__MAX_REQUESTS=5`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/bundlebox.toml`.
//! This can be overridden using the `BUNDLEBOX_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    AdmissionConfig, ArchiveConfig, BatchConfig, Config, FetchConfig, NotifyConfig,
    ServerConfig, StorageConfig, StorageProvider, TelemetryConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`BUNDLEBOX__*`)
    /// 2. TOML file (default: `config/bundlebox.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let mut config = sources::load_from_sources(path)?;
        sources::load_secrets(&mut config);
        validation::validate(&config)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(
            &config_path,
            r#"
[storage]
provider = "memory"
            "#,
        )
        .unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.storage.provider, StorageProvider::Memory);
        assert_eq!(config.fetch.max_attempts, 3);
    }

    #[test]
    fn test_validation_runs_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(
            &config_path,
            r#"
[storage]
provider = "memory"

[batch]
photo_batch_size = 2
video_batch_size = 4
            "#,
        )
        .unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::VideoBatchLargerThanPhoto { .. })
        ));
    }

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(
            &config_path,
            r#"
[server]
bind_addr = "0.0.0.0:8080"
max_payload_bytes = "5MB"
max_entries_per_job = 2000

[storage]
provider = "local"
root = "data/archives"
key_prefix = "exports"
upload_part_bytes = "16MB"

[fetch]
base_timeout_ms = 20000
per_mb_timeout_ms = 2000
photo_min_timeout_ms = 30000
video_min_timeout_ms = 120000
max_timeout_ms = 300000
max_attempts = 3

[archive]
max_entry_bytes = "200MB"
max_name_bytes = 180

[batch]
photo_batch_size = 10
video_batch_size = 2
yield_after_bytes = "16MB"

[admission]
window_secs = 60
max_requests = 4
breaker_failure_threshold = 2
breaker_cooldown_secs = 300

[telemetry]
log_filter = "bundlebox=debug,info"
            "#,
        )
        .unwrap();

        let config = Config::load_from_path(config_path).unwrap();

        assert_eq!(config.server.max_entries_per_job, 2000);
        assert_eq!(config.storage.key_prefix, "exports");
        assert_eq!(config.storage.upload_part_bytes, ByteSize::mib(16));
        assert_eq!(config.fetch.max_timeout_ms, 300_000);
        assert_eq!(config.archive.max_name_bytes, 180);
        assert_eq!(config.batch.yield_after_bytes, ByteSize::mib(16));
        assert_eq!(config.admission.breaker_failure_threshold, 2);
        assert_eq!(config.telemetry.log_filter, "bundlebox=debug,info");
    }
}
