use crate::version::DEFAULT_PRECISION;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub const DEFAULT_DATABASE_URL: &str = "sqlite://clusterdb.sqlite";

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_precision() -> usize {
    DEFAULT_PRECISION
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Upgrade tool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Number of version segments compared when resolving catalogs.
    /// Zero compares every segment.
    #[serde(default = "default_precision")]
    pub version_precision: usize,
    #[serde(default = "default_true")]
    pub lock_enabled: bool,
    /// Fail the data phase when reconciliation fails for any cluster.
    #[serde(default)]
    pub strict_reconciliation: bool,
    /// Default tracing filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            version_precision: default_precision(),
            lock_enabled: true,
            strict_reconciliation: false,
            log_level: default_log_level(),
        }
    }
}

/// Read the configuration file
pub async fn read_config(config_path: &Path) -> Result<Option<UpgradeConfig>, ConfigError> {
    if !config_path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(config_path).await?;
    let config: UpgradeConfig = serde_json::from_str(&content)?;
    Ok(Some(config))
}

/// Write the configuration file
pub async fn write_config(config_path: &Path, config: &UpgradeConfig) -> Result<(), ConfigError> {
    let content = serde_json::to_string_pretty(config)?;
    fs::write(config_path, content).await?;
    Ok(())
}
