//! Versioned schema and data upgrades.
//!
//! # Overview
//!
//! - Each release ships an [`UpgradeCatalog`] registered in a [`CatalogRegistry`]
//! - The registry resolves the catalogs between the stamped version and a
//!   target, with the final catalog always last
//! - The [`UpgradeExecutor`] runs every schema phase first, then starts the
//!   mapped store and runs each catalog's data phases followed by its stamp
//! - A failed run leaves the stamp at the last fully applied catalog; rerunning
//!   resumes from there
//!
//! # Usage
//!
//! ```ignore
//! let registry = create_registry(DEFAULT_PRECISION)?;
//! let executor = UpgradeExecutor::new(registry, accessor, store);
//! let report = executor.upgrade("1.3.0").await?;
//! ```

pub mod catalogs;
mod context;
mod executor;
mod lock;
mod registry;
mod stamp;
mod types;

pub use catalogs::{builtin_catalogs, create_registry, DataStep, DeclarativeCatalog};
pub use context::{DataContext, SchemaContext};
pub use executor::{ExecutorOptions, UpgradeExecutor, UpgradePlan, UpgradeState};
pub use lock::UpgradeLock;
pub use registry::{CatalogRegistry, RegistryError};
pub use stamp::{metainfo_table, read_stamp, write_stamp};
pub use types::{
    catalog_label, AppliedCatalog, MigrationError, Phase, UpgradeCatalog, UpgradeError,
    UpgradeReport,
};
