use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Persistence layer has not been started")]
    NotStarted,

    #[error("Required table {0} does not exist")]
    MissingTable(String),

    #[error("Corrupt configuration record: {0}")]
    Corrupt(String),
}

/// A managed cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub id: i64,
    pub name: String,
}

/// One revision of a cluster's configuration of a given type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfigurationRevision {
    pub cluster_id: i64,
    #[serde(rename = "type")]
    pub config_type: String,
    pub tag: String,
    /// Revision number within cluster + type, starting at 1
    pub version: i64,
    pub properties: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}
