//! Built-in upgrade catalogs.
//!
//! Add new catalogs to [`builtin_catalogs`]; order does not matter, the
//! registry sorts them.

pub mod declarative;
pub mod final_catalog;
pub mod v1_0_0;
pub mod v1_1_0;
pub mod v1_2_0;

use super::registry::{CatalogRegistry, RegistryError};
use super::types::UpgradeCatalog;
use std::sync::Arc;

pub use declarative::{DataStep, DeclarativeCatalog};
pub use final_catalog::FinalCatalog;
pub use v1_0_0::BaselineCatalog;

pub fn builtin_catalogs() -> Vec<Arc<dyn UpgradeCatalog>> {
    vec![
        Arc::new(BaselineCatalog::new()),
        Arc::new(v1_1_0::catalog()),
        Arc::new(v1_2_0::catalog()),
        Arc::new(FinalCatalog::new()),
    ]
}

/// Registry of the built-in catalogs compared at `precision`.
pub fn create_registry(precision: usize) -> Result<Arc<CatalogRegistry>, RegistryError> {
    CatalogRegistry::with_precision(builtin_catalogs(), precision).map(Arc::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::{DEFAULT_PRECISION, TOOL_VERSION};

    #[test]
    fn test_create_registry() {
        let registry = create_registry(DEFAULT_PRECISION).expect("Builtin catalogs should be valid");
        assert_eq!(
            registry.available_versions(),
            vec!["1.0.0", "1.1.0", "1.2.0", TOOL_VERSION]
        );
        assert_eq!(registry.latest_version(), Some(TOOL_VERSION));
    }

    #[test]
    fn test_fresh_install_path() {
        let registry = create_registry(DEFAULT_PRECISION).unwrap();
        let path = registry.resolve_path(None, TOOL_VERSION).unwrap();

        assert_eq!(path.len(), 4);
        assert!(path.last().map(|c| c.is_final()).unwrap_or(false));
    }

    #[test]
    fn test_partial_upgrade_path() {
        let registry = create_registry(DEFAULT_PRECISION).unwrap();
        let path = registry.resolve_path(Some("1.1.0"), "1.2.0").unwrap();

        let targets: Vec<_> = path.iter().map(|c| c.target_version()).collect();
        assert_eq!(targets, vec!["1.2.0"]);
    }
}
