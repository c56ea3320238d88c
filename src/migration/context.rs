//! Phase contexts handed to catalogs.

use super::types::MigrationError;
use crate::cluster::{
    ClusterConfigStore, ConfigReconciler, ConfigUpdate, ReconcileSummary,
};
use crate::schema::{SchemaPrimitives, SchemaStep, SqlValue};
use std::sync::Arc;
use tracing::debug;

/// What a schema phase may touch: raw primitives only.
pub struct SchemaContext {
    primitives: SchemaPrimitives,
}

impl SchemaContext {
    pub fn new(primitives: SchemaPrimitives) -> Self {
        Self { primitives }
    }

    pub fn primitives(&self) -> &SchemaPrimitives {
        &self.primitives
    }

    pub async fn apply_all(&self, steps: &[SchemaStep]) -> Result<(), MigrationError> {
        self.primitives.apply_all(steps).await?;
        Ok(())
    }
}

/// What the data phases may touch. Raw SQL issued through this context
/// invalidates the mapped store's cache.
pub struct DataContext {
    primitives: SchemaPrimitives,
    store: Arc<dyn ClusterConfigStore>,
    reconciler: ConfigReconciler,
    strict_reconciliation: bool,
}

impl DataContext {
    pub fn new(
        primitives: SchemaPrimitives,
        store: Arc<dyn ClusterConfigStore>,
        strict_reconciliation: bool,
    ) -> Self {
        let reconciler = ConfigReconciler::new(store.clone());
        Self {
            primitives,
            store,
            reconciler,
            strict_reconciliation,
        }
    }

    pub fn store(&self) -> &Arc<dyn ClusterConfigStore> {
        &self.store
    }

    pub fn reconciler(&self) -> &ConfigReconciler {
        &self.reconciler
    }

    /// Execute a raw data statement and drop any cached mapped rows.
    pub async fn execute_raw(&self, sql: &str, args: &[SqlValue]) -> Result<u64, MigrationError> {
        let result = self.primitives.accessor().execute(sql, args).await;
        self.store.invalidate_cache();

        let rows = result.map_err(|e| MigrationError::DataMigrationFailed(e.to_string()))?;
        debug!(rows, "Raw data statement executed");
        Ok(rows)
    }

    /// Read-only raw query.
    pub async fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<Vec<SqlValue>>, MigrationError> {
        self.primitives
            .accessor()
            .fetch_all(sql, args)
            .await
            .map_err(|e| MigrationError::DataMigrationFailed(e.to_string()))
    }

    /// Point a sequence past the highest id in `table.column`.
    pub async fn sync_sequence(&self, name: &str, table: &str, column: &str) -> Result<i64, MigrationError> {
        let result = self.primitives.sync_sequence(name, table, column).await;
        self.store.invalidate_cache();
        Ok(result?)
    }

    /// Reconcile `update` across every cluster. Per-cluster failures are
    /// collected; they only fail the phase under strict reconciliation.
    pub async fn reconcile_all(&self, update: &ConfigUpdate) -> Result<ReconcileSummary, MigrationError> {
        let summary = self.reconciler.reconcile_all(update).await?;
        if self.strict_reconciliation && !summary.is_success() {
            return Err(MigrationError::ReconciliationFailed {
                config_type: summary.config_type.clone(),
                failed: summary.failed(),
            });
        }
        Ok(summary)
    }
}
