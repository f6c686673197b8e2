//! Orchestrator configuration model.
//!
//! Plain serde structs with programmatic defaults; loading and validation
//! live in the infrastructure layer.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metal: MetalDriverConfig,
    #[serde(default)]
    pub bmc: BmcDriverConfig,
}

/// Where the site design comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site name tasks are created against
    pub name: String,
    /// Path of the YAML site design
    pub design_path: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            design_path: "site.yaml".to_string(),
        }
    }
}

/// Task store backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database URL
    pub database_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:slipway.db".to_string(),
        }
    }
}

/// Logging output configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// One of trace, debug, info, warn, error
    pub level: String,
    /// One of json, pretty
    pub format: String,
    /// When set, logs are also written to rotated files in this directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            log_dir: None,
        }
    }
}

/// Machine-provisioning service driver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetalDriverConfig {
    /// Base URL of the provisioning API
    pub api_url: String,
    /// Opaque credential sent with every request
    pub api_key: String,
    /// Downgrade to http when false and the URL has no scheme
    pub use_ssl: bool,
    /// Transport-level retry cap for transient faults
    pub max_retries: u32,
    /// Base delay of the retry envelope, in milliseconds
    pub retry_base_ms: u64,
    /// Per-request transport timeout
    pub request_timeout_secs: u64,
    /// Coarse tick the dispatch loops poll subtasks on
    pub poll_interval_secs: u64,
    /// How long the parent waits for network template convergence
    pub network_template_timeout_secs: u64,
}

impl Default for MetalDriverConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5240/api/2.0/".to_string(),
            api_key: String::new(),
            use_ssl: true,
            max_retries: 3,
            retry_base_ms: 500,
            request_timeout_secs: 30,
            poll_interval_secs: 60,
            network_template_timeout_secs: 120,
        }
    }
}

/// Out-of-band controller driver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BmcDriverConfig {
    /// Speak https to controllers
    pub use_ssl: bool,
    /// Transport-level retry cap for transient faults
    pub max_retries: u32,
    /// Base delay of the retry envelope, in milliseconds
    pub retry_base_ms: u64,
    /// Per-request transport timeout
    pub request_timeout_secs: u64,
    /// How many times to poll for a power state change
    pub power_state_change_max_retries: u32,
    /// Seconds between power state polls
    pub power_state_change_retry_interval_secs: u64,
    /// Concurrent workers per task
    pub worker_pool_size: usize,
    /// Overall per-task wait, in minutes
    pub task_timeout_mins: u64,
}

impl Default for BmcDriverConfig {
    fn default() -> Self {
        Self {
            use_ssl: true,
            max_retries: 10,
            retry_base_ms: 500,
            request_timeout_secs: 30,
            power_state_change_max_retries: 18,
            power_state_change_retry_interval_secs: 10,
            worker_pool_size: 16,
            task_timeout_mins: 30,
        }
    }
}
