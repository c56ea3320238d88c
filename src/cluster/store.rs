//! Mapped persistence for clusters and their configuration revisions.

use super::types::{Cluster, ClusterConfigurationRevision, StoreError};
use crate::schema::{SchemaAccessor, SqlValue};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

pub const CLUSTERS_TABLE: &str = "clusters";
pub const CLUSTER_CONFIG_TABLE: &str = "clusterconfig";

/// Cluster and configuration access used by data phases.
///
/// Implementations may cache; callers that mutate rows behind the store's
/// back must call [`ClusterConfigStore::invalidate_cache`].
#[async_trait]
pub trait ClusterConfigStore: Send + Sync {
    async fn start(&self) -> Result<(), StoreError>;

    async fn stop(&self);

    fn is_started(&self) -> bool;

    fn invalidate_cache(&self);

    async fn clusters(&self) -> Result<Vec<Cluster>, StoreError>;

    /// The revision currently selected for `config_type`, if any.
    async fn selected_revision(
        &self,
        cluster: &Cluster,
        config_type: &str,
    ) -> Result<Option<ClusterConfigurationRevision>, StoreError>;

    /// Persist `revision` and make it the selected one for its type.
    async fn save_selected_revision(
        &self,
        cluster: &Cluster,
        revision: &ClusterConfigurationRevision,
    ) -> Result<(), StoreError>;
}

type CacheKey = (i64, String);

/// SQL-backed store with a cache of selected revisions.
pub struct SqlClusterStore {
    accessor: Arc<dyn SchemaAccessor>,
    started: AtomicBool,
    cache: RwLock<HashMap<CacheKey, Option<ClusterConfigurationRevision>>>,
}

impl SqlClusterStore {
    pub fn new(accessor: Arc<dyn SchemaAccessor>) -> Self {
        Self {
            accessor,
            started: AtomicBool::new(false),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn ensure_started(&self) -> Result<(), StoreError> {
        if self.is_started() {
            Ok(())
        } else {
            Err(StoreError::NotStarted)
        }
    }

    fn cached(&self, key: &CacheKey) -> Option<Option<ClusterConfigurationRevision>> {
        self.cache.read().ok().and_then(|cache| cache.get(key).cloned())
    }

    fn remember(&self, key: CacheKey, value: Option<ClusterConfigurationRevision>) {
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key, value);
        }
    }

    /// Number of cached cluster/type entries.
    pub fn cached_entries(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }
}

fn text(value: Option<&SqlValue>, what: &str) -> Result<String, StoreError> {
    value
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| StoreError::Corrupt(format!("missing {}", what)))
}

fn integer(value: Option<&SqlValue>, what: &str) -> Result<i64, StoreError> {
    value
        .and_then(|v| v.as_i64())
        .ok_or_else(|| StoreError::Corrupt(format!("missing {}", what)))
}

#[async_trait]
impl ClusterConfigStore for SqlClusterStore {
    async fn start(&self) -> Result<(), StoreError> {
        for table in [CLUSTERS_TABLE, CLUSTER_CONFIG_TABLE] {
            if !self.accessor.table_exists(table).await? {
                return Err(StoreError::MissingTable(table.to_string()));
            }
        }

        self.invalidate_cache();
        self.started.store(true, Ordering::SeqCst);
        info!("Persistence layer started");
        Ok(())
    }

    async fn stop(&self) {
        if self.started.swap(false, Ordering::SeqCst) {
            self.invalidate_cache();
            info!("Persistence layer stopped");
        }
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn invalidate_cache(&self) {
        if let Ok(mut cache) = self.cache.write() {
            if !cache.is_empty() {
                debug!(entries = cache.len(), "Invalidating configuration cache");
            }
            cache.clear();
        }
    }

    async fn clusters(&self) -> Result<Vec<Cluster>, StoreError> {
        self.ensure_started()?;

        let rows = self
            .accessor
            .fetch_all(
                &format!(
                    "SELECT cluster_id, cluster_name FROM {} ORDER BY cluster_id",
                    CLUSTERS_TABLE
                ),
                &[],
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(Cluster {
                    id: integer(row.first(), "cluster_id")?,
                    name: text(row.get(1), "cluster_name")?,
                })
            })
            .collect()
    }

    async fn selected_revision(
        &self,
        cluster: &Cluster,
        config_type: &str,
    ) -> Result<Option<ClusterConfigurationRevision>, StoreError> {
        self.ensure_started()?;

        let key = (cluster.id, config_type.to_string());
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        let row = self
            .accessor
            .fetch_all(
                &format!(
                    "SELECT version_tag, version, config_data, create_timestamp FROM {} \
                     WHERE cluster_id = ? AND type_name = ? AND selected = 1 \
                     ORDER BY version DESC LIMIT 1",
                    CLUSTER_CONFIG_TABLE
                ),
                &[SqlValue::Integer(cluster.id), config_type.into()],
            )
            .await?
            .into_iter()
            .next();

        let revision = match row {
            None => None,
            Some(row) => {
                let properties: BTreeMap<String, String> =
                    serde_json::from_str(&text(row.get(2), "config_data")?)?;
                let millis = integer(row.get(3), "create_timestamp")?;
                let created_at = Utc
                    .timestamp_millis_opt(millis)
                    .single()
                    .ok_or_else(|| StoreError::Corrupt(format!("bad timestamp {}", millis)))?;

                Some(ClusterConfigurationRevision {
                    cluster_id: cluster.id,
                    config_type: config_type.to_string(),
                    tag: text(row.first(), "version_tag")?,
                    version: integer(row.get(1), "version")?,
                    properties,
                    created_at,
                })
            }
        };

        self.remember(key, revision.clone());
        Ok(revision)
    }

    async fn save_selected_revision(
        &self,
        cluster: &Cluster,
        revision: &ClusterConfigurationRevision,
    ) -> Result<(), StoreError> {
        self.ensure_started()?;

        let config_data = serde_json::to_string(&revision.properties)?;
        let result = self
            .accessor
            .execute_atomic(&[
                (
                    format!(
                        "UPDATE {} SET selected = 0 WHERE cluster_id = ? AND type_name = ?",
                        CLUSTER_CONFIG_TABLE
                    ),
                    vec![
                        SqlValue::Integer(cluster.id),
                        revision.config_type.as_str().into(),
                    ],
                ),
                (
                    format!(
                        "INSERT INTO {} (cluster_id, type_name, version_tag, version, config_data, \
                         create_timestamp, selected) VALUES (?, ?, ?, ?, ?, ?, 1)",
                        CLUSTER_CONFIG_TABLE
                    ),
                    vec![
                        SqlValue::Integer(cluster.id),
                        revision.config_type.as_str().into(),
                        revision.tag.as_str().into(),
                        SqlValue::Integer(revision.version),
                        config_data.into(),
                        SqlValue::Integer(revision.created_at.timestamp_millis()),
                    ],
                ),
            ])
            .await;

        let key = (cluster.id, revision.config_type.clone());
        match result {
            Ok(()) => {
                self.remember(key, Some(revision.clone()));
                Ok(())
            }
            Err(e) => {
                if let Ok(mut cache) = self.cache.write() {
                    cache.remove(&key);
                }
                Err(e.into())
            }
        }
    }
}
