//! Configuration management for notify-quota.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{QuotaError, Result};

/// Prefix for environment variable overrides, e.g. `NOTIFY_QUOTA_LOG_LEVEL`.
const ENV_PREFIX: &str = "NOTIFY_QUOTA";

/// Main configuration for the notify-quota service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Path to the rate limit rules file. Without one, nothing is limited.
    #[serde(default)]
    pub rules_path: Option<String>,

    /// Seconds between idle key sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Default log filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            rules_path: None,
            sweep_interval_secs: default_sweep_interval(),
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

fn default_sweep_interval() -> u64 {
    crate::ratelimit::DEFAULT_SWEEP_INTERVAL.as_secs()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl QuotaConfig {
    /// Load configuration from an optional YAML file, with `NOTIFY_QUOTA_*`
    /// environment variables taking precedence.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        Self::build(builder.add_source(config::Environment::with_prefix(ENV_PREFIX)))
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::build(
            config::Config::builder()
                .add_source(config::File::from_str(yaml, config::FileFormat::Yaml)),
        )
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let config: QuotaConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| QuotaError::Config(e.to_string()))?;

        if config.sweep_interval_secs == 0 {
            return Err(QuotaError::Config(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        Ok(config)
    }

    /// Time between idle key sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
