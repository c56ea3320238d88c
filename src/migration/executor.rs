//! Upgrade executor: runs the resolved catalogs phase by phase.

use super::context::{DataContext, SchemaContext};
use super::lock::UpgradeLock;
use super::registry::CatalogRegistry;
use super::stamp::{read_stamp, write_stamp};
use super::types::{
    catalog_label, AppliedCatalog, MigrationError, Phase, UpgradeCatalog, UpgradeError,
    UpgradeReport,
};
use crate::cluster::ClusterConfigStore;
use crate::schema::{SchemaAccessor, SchemaPrimitives};
use crate::version::{compare_stamp, Version, VersionComparison};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Where an upgrade run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeState {
    Idle,
    ResolvingPath,
    RunningSchemaPhase,
    PersistenceStarted,
    RunningDataPhases,
    Stamped,
    Done,
    Failed,
}

/// Options that change how the executor behaves.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorOptions {
    pub lock_enabled: bool,
    pub strict_reconciliation: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            lock_enabled: true,
            strict_reconciliation: false,
        }
    }
}

/// What a run would do, computed without mutating anything.
pub struct UpgradePlan {
    pub stamped: Option<String>,
    pub target: String,
    pub catalogs: Vec<Arc<dyn UpgradeCatalog>>,
}

/// Executor for upgrade runs.
///
/// All schema phases of the resolved path run first, each inside its own
/// transaction, while the mapped store is stopped. The store is then started
/// and each catalog's pre-data and data phases run, followed by the stamp.
/// A failure stops the run; the stamp keeps the last fully applied catalog.
pub struct UpgradeExecutor {
    registry: Arc<CatalogRegistry>,
    primitives: SchemaPrimitives,
    store: Arc<dyn ClusterConfigStore>,
    options: ExecutorOptions,
    state: Mutex<UpgradeState>,
}

fn failed(catalog: &dyn UpgradeCatalog, phase: Phase, source: MigrationError) -> UpgradeError {
    UpgradeError::CatalogFailed {
        source_version: catalog.source_version().unwrap_or("none").to_string(),
        target_version: catalog.target_version().to_string(),
        phase,
        source,
    }
}

impl UpgradeExecutor {
    pub fn new(
        registry: Arc<CatalogRegistry>,
        accessor: Arc<dyn SchemaAccessor>,
        store: Arc<dyn ClusterConfigStore>,
    ) -> Self {
        Self {
            registry,
            primitives: SchemaPrimitives::new(accessor),
            store,
            options: ExecutorOptions::default(),
            state: Mutex::new(UpgradeState::Idle),
        }
    }

    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> UpgradeState {
        self.state.lock().map(|s| *s).unwrap_or(UpgradeState::Failed)
    }

    fn transition(&self, next: UpgradeState) {
        if let Ok(mut state) = self.state.lock() {
            info!(from = ?*state, to = ?next, "Upgrade state change");
            *state = next;
        }
    }

    /// Read the stamp and resolve the catalogs needed to reach `target`.
    pub async fn plan(&self, target: &str) -> Result<UpgradePlan, UpgradeError> {
        let target_version = Version::parse(target)?;
        let stamped = read_stamp(self.primitives.accessor().as_ref()).await?;

        if let Some(stamp) = &stamped {
            let stamp_version = Version::parse(stamp)?;
            if compare_stamp(&stamp_version, &target_version, self.registry.precision())
                == VersionComparison::StampAhead
            {
                return Err(UpgradeError::DowngradeRequested {
                    stamped: stamp.clone(),
                    requested: target.to_string(),
                });
            }
        }

        let catalogs = self.registry.resolve_path(stamped.as_deref(), target)?;

        if catalogs.is_empty() && stamped.is_none() {
            if let Some(earliest) = self.registry.earliest_version() {
                return Err(UpgradeError::TargetPredatesCatalogs {
                    requested: target.to_string(),
                    earliest: earliest.to_string(),
                });
            }
        }

        Ok(UpgradePlan {
            stamped,
            target: target_version.to_string(),
            catalogs,
        })
    }

    /// Bring the database to `target`.
    pub async fn upgrade(&self, target: &str) -> Result<UpgradeReport, UpgradeError> {
        let lock = if self.options.lock_enabled {
            Some(UpgradeLock::acquire(&self.primitives).await?)
        } else {
            None
        };

        let result = self.run(target).await;

        if let Some(lock) = lock {
            if let Err(e) = lock.release(&self.primitives).await {
                warn!(error = %e, "Failed to release upgrade lock");
            }
        }

        match &result {
            Ok(report) => {
                self.transition(UpgradeState::Done);
                info!(
                    from = report.from_version.as_deref().unwrap_or("none"),
                    to = %report.to_version,
                    count = report.applied.len(),
                    "Upgrade completed successfully"
                );
            }
            Err(e) => {
                self.transition(UpgradeState::Failed);
                error!(error = %e, "Upgrade failed");
            }
        }

        result
    }

    async fn run(&self, target: &str) -> Result<UpgradeReport, UpgradeError> {
        self.transition(UpgradeState::ResolvingPath);
        let plan = self.plan(target).await?;

        info!(
            from = plan.stamped.as_deref().unwrap_or("none"),
            to = %plan.target,
            catalogs = plan.catalogs.len(),
            "Starting upgrade"
        );

        let mut report = UpgradeReport {
            from_version: plan.stamped.clone(),
            to_version: plan.target.clone(),
            applied: Vec::new(),
            stamped_version: plan.stamped.clone(),
        };

        if plan.catalogs.is_empty() {
            info!("No catalogs to apply, already at target version");
            return Ok(report);
        }

        self.transition(UpgradeState::RunningSchemaPhase);
        for catalog in &plan.catalogs {
            self.run_schema_phase(catalog.as_ref()).await?;
        }

        self.store.start().await?;
        self.transition(UpgradeState::PersistenceStarted);

        let result = self.run_data_phases(&plan.catalogs, &mut report).await;
        self.store.stop().await;
        result?;

        Ok(report)
    }

    async fn run_schema_phase(&self, catalog: &dyn UpgradeCatalog) -> Result<(), UpgradeError> {
        let label = catalog_label(catalog);
        info!(catalog = %label, phase = %Phase::Schema, "Running phase");

        let accessor = self.primitives.accessor();
        accessor
            .begin()
            .await
            .map_err(|e| failed(catalog, Phase::Schema, MigrationError::Schema(e.into())))?;

        let ctx = SchemaContext::new(self.primitives.clone());
        match catalog.run_schema_changes(&ctx).await {
            Ok(()) => accessor
                .commit()
                .await
                .map_err(|e| failed(catalog, Phase::Schema, MigrationError::Schema(e.into()))),
            Err(e) => {
                error!(catalog = %label, phase = %Phase::Schema, error = %e, "Phase failed");
                if let Err(rollback_err) = accessor.rollback().await {
                    error!(catalog = %label, error = %rollback_err, "Rollback failed");
                }
                Err(failed(catalog, Phase::Schema, e))
            }
        }
    }

    async fn run_data_phases(
        &self,
        catalogs: &[Arc<dyn UpgradeCatalog>],
        report: &mut UpgradeReport,
    ) -> Result<(), UpgradeError> {
        let ctx = DataContext::new(
            self.primitives.clone(),
            self.store.clone(),
            self.options.strict_reconciliation,
        );

        for catalog in catalogs {
            let catalog = catalog.as_ref();
            let label = catalog_label(catalog);
            self.transition(UpgradeState::RunningDataPhases);

            info!(catalog = %label, phase = %Phase::PreData, "Running phase");
            catalog
                .run_pre_data_changes(&ctx)
                .await
                .map_err(|e| failed(catalog, Phase::PreData, e))?;

            info!(catalog = %label, phase = %Phase::Data, "Running phase");
            catalog
                .run_data_changes(&ctx)
                .await
                .map_err(|e| failed(catalog, Phase::Data, e))?;

            write_stamp(&self.primitives, catalog.target_version())
                .await
                .map_err(|source| UpgradeError::StampFailed {
                    version: catalog.target_version().to_string(),
                    source,
                })?;

            self.transition(UpgradeState::Stamped);
            report.stamped_version = Some(catalog.target_version().to_string());
            report.applied.push(AppliedCatalog {
                source_version: catalog.source_version().map(str::to_string),
                target_version: catalog.target_version().to_string(),
                description: catalog.description().to_string(),
            });
        }

        Ok(())
    }
}
