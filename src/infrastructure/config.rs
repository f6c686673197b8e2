//! Configuration loading.
//!
//! Hierarchical merge with figment: programmatic defaults, then the config
//! file, then `SLIPWAY_*` environment variables on top.

use anyhow::{Context, Result};
use figment::providers::{Data, Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::OrchestratorConfig;

/// Configuration validation failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database URL cannot be empty")]
    EmptyDatabaseUrl,

    #[error("Provisioning API URL cannot be empty")]
    EmptyApiUrl,

    #[error("Invalid max_retries: 0. At least one attempt is required")]
    ZeroRetries,

    #[error("Invalid worker_pool_size: 0. Must be at least 1")]
    ZeroWorkerPool,

    #[error("Invalid poll interval: 0 seconds")]
    ZeroPollInterval,
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the default file plus the environment.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. slipway.yaml in the working directory
    /// 3. Environment variables (`SLIPWAY_` prefix, `__` section separator)
    pub fn load() -> Result<OrchestratorConfig> {
        Self::figment(Yaml::file("slipway.yaml"))
            .extract()
            .context("Failed to extract configuration")
            .and_then(|config| {
                Self::validate(&config)?;
                Ok(config)
            })
    }

    /// Load configuration from a specific file plus the environment.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<OrchestratorConfig> {
        let config: OrchestratorConfig = Self::figment(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;
        Self::validate(&config)?;
        Ok(config)
    }

    fn figment(file: Data<Yaml>) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(OrchestratorConfig::default()))
            .merge(file)
            .merge(Env::prefixed("SLIPWAY_").split("__"))
    }

    /// Validate configuration after loading.
    pub fn validate(config: &OrchestratorConfig) -> Result<(), ConfigError> {
        if config.store.database_url.is_empty() {
            return Err(ConfigError::EmptyDatabaseUrl);
        }
        if config.metal.api_url.is_empty() {
            return Err(ConfigError::EmptyApiUrl);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.metal.max_retries == 0 || config.bmc.max_retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }
        if config.metal.poll_interval_secs == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if config.bmc.worker_pool_size == 0 {
            return Err(ConfigError::ZeroWorkerPool);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::OrchestratorConfig;

    #[test]
    fn test_defaults_validate() {
        let config = OrchestratorConfig::default();
        ConfigLoader::validate(&config).unwrap();
    }

    #[test]
    fn test_rejects_bad_log_level() {
        let mut config = OrchestratorConfig::default();
        config.logging.level = "loud".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_rejects_zero_worker_pool() {
        let mut config = OrchestratorConfig::default();
        config.bmc.worker_pool_size = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ZeroWorkerPool)
        ));
    }
}
