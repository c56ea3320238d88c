//! Types for the migration system.

use super::context::{DataContext, SchemaContext};
use super::registry::RegistryError;
use crate::cluster::{ReconcileError, StoreError};
use crate::schema::SchemaError;
use crate::version::VersionError;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Errors raised by a catalog phase.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Reconciliation of {config_type} failed for {failed} cluster(s)")]
    ReconciliationFailed { config_type: String, failed: usize },

    #[error("Data migration failed: {0}")]
    DataMigrationFailed(String),
}

/// Errors that abort an upgrade run.
#[derive(Error, Debug)]
pub enum UpgradeError {
    #[error("Version error: {0}")]
    Version(#[from] VersionError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Another upgrade holds the lock (holder {holder}, acquired {acquired_at})")]
    Locked { holder: String, acquired_at: String },

    #[error("Database is stamped {stamped}, which is newer than the requested {requested}")]
    DowngradeRequested { stamped: String, requested: String },

    #[error("Requested version {requested} predates the earliest catalog {earliest}")]
    TargetPredatesCatalogs { requested: String, earliest: String },

    #[error("Catalog {source_version} -> {target_version} failed in {phase} phase: {source}")]
    CatalogFailed {
        source_version: String,
        target_version: String,
        phase: Phase,
        #[source]
        source: MigrationError,
    },

    #[error("Failed to stamp version {version}: {source}")]
    StampFailed {
        version: String,
        #[source]
        source: SchemaError,
    },
}

/// The three ordered phases of a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Schema,
    PreData,
    Data,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Schema => f.write_str("DDL"),
            Phase::PreData => f.write_str("pre-DML"),
            Phase::Data => f.write_str("DML"),
        }
    }
}

/// One release's migration unit.
///
/// Schema changes run before the mapped persistence layer is started and may
/// only use raw primitives. Data changes run afterwards, in the same catalog
/// order, and are followed by the version stamp.
#[async_trait]
pub trait UpgradeCatalog: Send + Sync {
    /// The version this catalog expects to start from. Informational.
    fn source_version(&self) -> Option<&str>;

    /// The version this catalog produces.
    fn target_version(&self) -> &str;

    /// The final catalog always runs after every numbered catalog.
    fn is_final(&self) -> bool {
        false
    }

    /// Human-readable description of what this catalog does.
    fn description(&self) -> &str;

    async fn run_schema_changes(&self, ctx: &SchemaContext) -> Result<(), MigrationError>;

    async fn run_pre_data_changes(&self, _ctx: &DataContext) -> Result<(), MigrationError> {
        Ok(())
    }

    async fn run_data_changes(&self, ctx: &DataContext) -> Result<(), MigrationError>;
}

/// Label used in logs and reports: `source -> target`.
pub fn catalog_label(catalog: &dyn UpgradeCatalog) -> String {
    format!(
        "{} -> {}",
        catalog.source_version().unwrap_or("none"),
        catalog.target_version()
    )
}

/// A catalog that ran to completion and was stamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedCatalog {
    pub source_version: Option<String>,
    pub target_version: String,
    pub description: String,
}

/// Result of an upgrade run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeReport {
    /// Stamp found when the run started.
    pub from_version: Option<String>,
    /// The requested target.
    pub to_version: String,
    /// Catalogs that were applied, in order.
    pub applied: Vec<AppliedCatalog>,
    /// Stamp after the run.
    pub stamped_version: Option<String>,
}
