//! Partitioner configuration

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable naming an optional configuration file
pub const CONFIG_FILE_ENV: &str = "PARTITIONER_CONFIG_FILE";

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PartitionerConfig {
    /// Instance name used in structured logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port for planning, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Known MIG geometries file; the built-in catalog is used when unset
    #[serde(default)]
    pub known_geometries_file: Option<PathBuf>,

    /// Default planning deadline in seconds
    #[serde(default = "default_plan_timeout")]
    pub plan_timeout_secs: u64,

    /// Demand groups searched in parallel; defaults to available parallelism
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

fn default_instance_name() -> String {
    std::env::var("POD_NAME").unwrap_or_else(|_| "mig-partitioner".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_plan_timeout() -> u64 {
    30
}

impl Default for PartitionerConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            api_port: default_api_port(),
            known_geometries_file: None,
            plan_timeout_secs: default_plan_timeout(),
            max_concurrency: None,
        }
    }
}

impl PartitionerConfig {
    /// Load configuration from the optional config file and `PARTITIONER_*`
    /// environment variables, the latter taking precedence.
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(config::File::with_name(&path).required(true));
        }
        let config = builder
            .add_source(config::Environment::with_prefix("PARTITIONER"))
            .build()
            .context("Failed to read configuration")?;

        Self::from_config(config)
    }

    pub fn from_config(config: config::Config) -> Result<Self> {
        let parsed: Self = config
            .try_deserialize()
            .context("Invalid partitioner configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_port == 0 {
            bail!("api_port must be non-zero");
        }
        if self.plan_timeout_secs == 0 {
            bail!("plan_timeout_secs must be at least 1");
        }
        if self.max_concurrency == Some(0) {
            bail!("max_concurrency must be at least 1");
        }
        Ok(())
    }
}
