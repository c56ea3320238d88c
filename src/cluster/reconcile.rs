//! Merge-or-create reconciliation of cluster configuration properties.

use super::store::ClusterConfigStore;
use super::types::{Cluster, ClusterConfigurationRevision, StoreError};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration type must not be empty")]
    EmptyConfigType,
}

/// A requested change to one configuration type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub config_type: String,
    pub properties: BTreeMap<String, String>,
    pub remove_keys: BTreeSet<String>,
    /// `(old, new)` key renames, applied before merging.
    pub renames: Vec<(String, String)>,
    pub overwrite_existing: bool,
    pub create_if_absent: bool,
}

impl ConfigUpdate {
    pub fn new(config_type: impl Into<String>) -> Self {
        Self {
            config_type: config_type.into(),
            ..Default::default()
        }
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.remove_keys.insert(key.into());
        self
    }

    pub fn rename(mut self, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.renames.push((old.into(), new.into()));
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite_existing = overwrite;
        self
    }

    pub fn create_if_absent(mut self, create: bool) -> Self {
        self.create_if_absent = create;
        self
    }

    /// Apply this update to `current` and return the merged property set.
    ///
    /// Existing values are only replaced when `overwrite_existing` is set.
    pub fn merge(&self, current: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut merged = current.clone();

        for (old, new) in &self.renames {
            if !merged.contains_key(old) {
                continue;
            }
            if merged.contains_key(new) && !self.overwrite_existing {
                merged.remove(old);
                continue;
            }
            if let Some(value) = merged.remove(old) {
                merged.insert(new.clone(), value);
            }
        }

        for (key, value) in &self.properties {
            if self.overwrite_existing || !merged.contains_key(key) {
                merged.insert(key.clone(), value.clone());
            }
        }

        for key in &self.remove_keys {
            merged.remove(key);
        }

        merged
    }
}

/// Why a reconciliation produced no revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No selected revision and the update does not create one.
    ConfigAbsent,
    /// Merged properties equal the selected revision's.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created(ClusterConfigurationRevision),
    Skipped(SkipReason),
}

impl ReconcileOutcome {
    pub fn revision(&self) -> Option<&ClusterConfigurationRevision> {
        match self {
            ReconcileOutcome::Created(revision) => Some(revision),
            ReconcileOutcome::Skipped(_) => None,
        }
    }

    pub fn into_revision(self) -> Option<ClusterConfigurationRevision> {
        match self {
            ReconcileOutcome::Created(revision) => Some(revision),
            ReconcileOutcome::Skipped(_) => None,
        }
    }
}

/// Per-cluster result of [`ConfigReconciler::reconcile_all`].
#[derive(Debug)]
pub struct ClusterReconcileResult {
    pub cluster: Cluster,
    pub result: Result<ReconcileOutcome, ReconcileError>,
}

/// Results of reconciling one configuration type across every cluster.
#[derive(Debug)]
pub struct ReconcileSummary {
    pub config_type: String,
    pub results: Vec<ClusterReconcileResult>,
}

impl ReconcileSummary {
    pub fn created(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.result, Ok(ReconcileOutcome::Created(_))))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.result, Ok(ReconcileOutcome::Skipped(_))))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.result.is_err()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Tag and creation time for the revision after `previous`.
///
/// Tags are `version<millis>`; the stamp is bumped past the previous
/// revision's so tags stay distinct and ordered within a cluster and type.
fn next_tag(previous: Option<&ClusterConfigurationRevision>) -> (String, DateTime<Utc>) {
    let now = Utc::now();
    let mut millis = now.timestamp_millis();
    if let Some(previous) = previous {
        millis = millis.max(previous.created_at.timestamp_millis() + 1);
    }
    let created_at = Utc.timestamp_millis_opt(millis).single().unwrap_or(now);
    (format!("version{}", millis), created_at)
}

/// Creates configuration revisions for upgrade catalogs.
#[derive(Clone)]
pub struct ConfigReconciler {
    store: Arc<dyn ClusterConfigStore>,
}

impl ConfigReconciler {
    pub fn new(store: Arc<dyn ClusterConfigStore>) -> Self {
        Self { store }
    }

    /// Reconcile one cluster's configuration of `update.config_type`.
    pub async fn reconcile(
        &self,
        cluster: &Cluster,
        update: &ConfigUpdate,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if update.config_type.is_empty() {
            return Err(ReconcileError::EmptyConfigType);
        }

        let current = self
            .store
            .selected_revision(cluster, &update.config_type)
            .await?;

        if current.is_none() && !update.create_if_absent {
            debug!(
                cluster = %cluster.name,
                config_type = %update.config_type,
                "Configuration not present, skipping"
            );
            return Ok(ReconcileOutcome::Skipped(SkipReason::ConfigAbsent));
        }

        let empty = BTreeMap::new();
        let current_properties = current.as_ref().map(|r| &r.properties).unwrap_or(&empty);
        let merged = update.merge(current_properties);

        if &merged == current_properties {
            debug!(
                cluster = %cluster.name,
                config_type = %update.config_type,
                "Configuration unchanged, skipping"
            );
            return Ok(ReconcileOutcome::Skipped(SkipReason::Unchanged));
        }

        let (tag, created_at) = next_tag(current.as_ref());
        let revision = ClusterConfigurationRevision {
            cluster_id: cluster.id,
            config_type: update.config_type.clone(),
            tag,
            version: current.as_ref().map(|r| r.version + 1).unwrap_or(1),
            properties: merged,
            created_at,
        };

        self.store.save_selected_revision(cluster, &revision).await?;

        info!(
            cluster = %cluster.name,
            config_type = %revision.config_type,
            tag = %revision.tag,
            version = revision.version,
            "Created configuration revision"
        );
        Ok(ReconcileOutcome::Created(revision))
    }

    /// Reconcile every managed cluster, continuing past per-cluster failures.
    pub async fn reconcile_all(
        &self,
        update: &ConfigUpdate,
    ) -> Result<ReconcileSummary, ReconcileError> {
        let clusters = self.store.clusters().await?;
        let mut results = Vec::with_capacity(clusters.len());

        for cluster in clusters {
            let result = self.reconcile(&cluster, update).await;
            if let Err(e) = &result {
                error!(
                    cluster = %cluster.name,
                    config_type = %update.config_type,
                    error = %e,
                    "Configuration reconciliation failed"
                );
            }
            results.push(ClusterReconcileResult { cluster, result });
        }

        let summary = ReconcileSummary {
            config_type: update.config_type.clone(),
            results,
        };

        if summary.is_success() {
            info!(
                config_type = %summary.config_type,
                created = summary.created(),
                skipped = summary.skipped(),
                "Reconciled configuration across clusters"
            );
        } else {
            warn!(
                config_type = %summary.config_type,
                created = summary.created(),
                skipped = summary.skipped(),
                failed = summary.failed(),
                "Reconciled configuration with failures"
            );
        }

        Ok(summary)
    }
}
