pub mod cluster;
pub mod config;
pub mod migration;
pub mod schema;
pub mod utils;
pub mod version;

// Re-export commonly used types
pub use cluster::{
    ClusterConfigStore, ConfigReconciler, ConfigUpdate, ReconcileOutcome, ReconcileSummary,
    SqlClusterStore,
};
pub use config::{read_config, write_config, ConfigError, UpgradeConfig};
pub use migration::{
    create_registry, CatalogRegistry, ExecutorOptions, MigrationError, UpgradeCatalog,
    UpgradeError, UpgradeExecutor, UpgradeReport,
};
pub use schema::{SchemaAccessor, SchemaError, SchemaPrimitives, SqliteAccessor};
pub use version::{compare_versions, Version, VersionComparison, VersionError, TOOL_VERSION};
