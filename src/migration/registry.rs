//! Catalog registry and path resolution.

use super::types::UpgradeCatalog;
use crate::version::{Version, VersionError, DEFAULT_PRECISION};
use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid catalog version: {0}")]
    InvalidVersion(#[from] VersionError),

    #[error("Two catalogs target version {0}")]
    DuplicateTarget(String),

    #[error("More than one final catalog: {0} and {1}")]
    MultipleFinal(String, String),

    #[error("Final catalog {final_version} is older than catalog {numbered}")]
    FinalNotLatest {
        final_version: String,
        numbered: String,
    },
}

struct Entry {
    version: Version,
    catalog: Arc<dyn UpgradeCatalog>,
}

/// Immutable, ordered set of upgrade catalogs.
///
/// Numbered catalogs are kept in ascending target order and the final
/// catalog, if any, always sorts last. Its target must be above every
/// numbered target.
pub struct CatalogRegistry {
    entries: Vec<Entry>,
    precision: usize,
}

fn execution_order(a: &Entry, b: &Entry, precision: usize) -> Ordering {
    a.catalog
        .is_final()
        .cmp(&b.catalog.is_final())
        .then_with(|| a.version.compare_to(&b.version, precision))
}

impl CatalogRegistry {
    /// Build a registry compared at the default precision.
    pub fn new(catalogs: Vec<Arc<dyn UpgradeCatalog>>) -> Result<Self, RegistryError> {
        Self::with_precision(catalogs, DEFAULT_PRECISION)
    }

    pub fn with_precision(
        catalogs: Vec<Arc<dyn UpgradeCatalog>>,
        precision: usize,
    ) -> Result<Self, RegistryError> {
        let mut entries = Vec::with_capacity(catalogs.len());
        for catalog in catalogs {
            if let Some(source) = catalog.source_version() {
                Version::parse(source)?;
            }
            entries.push(Entry {
                version: Version::parse(catalog.target_version())?,
                catalog,
            });
        }

        for (i, a) in entries.iter().enumerate() {
            for b in &entries[i + 1..] {
                if a.catalog.is_final() && b.catalog.is_final() {
                    return Err(RegistryError::MultipleFinal(
                        a.version.to_string(),
                        b.version.to_string(),
                    ));
                }
                if a.version.compare_to(&b.version, precision) == Ordering::Equal {
                    return Err(RegistryError::DuplicateTarget(b.version.to_string()));
                }
                let (last, numbered) = match (a.catalog.is_final(), b.catalog.is_final()) {
                    (true, false) => (a, b),
                    (false, true) => (b, a),
                    _ => continue,
                };
                // The final catalog stamps last, so its target must not lower the stamp.
                if last.version.compare_to(&numbered.version, precision) == Ordering::Less {
                    return Err(RegistryError::FinalNotLatest {
                        final_version: last.version.to_string(),
                        numbered: numbered.version.to_string(),
                    });
                }
            }
        }

        entries.sort_by(|a, b| execution_order(a, b, precision));
        Ok(Self { entries, precision })
    }

    pub fn precision(&self) -> usize {
        self.precision
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All catalogs in execution order.
    pub fn catalogs(&self) -> impl Iterator<Item = &Arc<dyn UpgradeCatalog>> {
        self.entries.iter().map(|e| &e.catalog)
    }

    /// Target versions in execution order.
    pub fn available_versions(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.version.to_string()).collect()
    }

    /// Highest target version.
    pub fn latest_version(&self) -> Option<&str> {
        self.entries
            .iter()
            .max_by(|a, b| a.version.compare_to(&b.version, self.precision))
            .map(|e| e.version.as_str())
    }

    /// Lowest target version.
    pub fn earliest_version(&self) -> Option<&str> {
        self.entries
            .iter()
            .min_by(|a, b| a.version.compare_to(&b.version, self.precision))
            .map(|e| e.version.as_str())
    }

    /// Catalogs whose target lies in `(source, target]`, in execution order.
    ///
    /// A missing source means a fresh install: every catalog up to `target`
    /// applies.
    pub fn resolve_path(
        &self,
        source: Option<&str>,
        target: &str,
    ) -> Result<Vec<Arc<dyn UpgradeCatalog>>, VersionError> {
        let source = source.map(Version::parse).transpose()?;
        let target = Version::parse(target)?;

        Ok(self
            .entries
            .iter()
            .filter(|e| {
                source
                    .as_ref()
                    .map_or(true, |s| s.compare_to(&e.version, self.precision) == Ordering::Less)
            })
            .filter(|e| e.version.compare_to(&target, self.precision) != Ordering::Greater)
            .map(|e| Arc::clone(&e.catalog))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::context::{DataContext, SchemaContext};
    use crate::migration::types::MigrationError;

    struct MockCatalog {
        target: String,
        is_final: bool,
    }

    impl MockCatalog {
        fn numbered(target: &str) -> Arc<dyn UpgradeCatalog> {
            Arc::new(Self {
                target: target.to_string(),
                is_final: false,
            })
        }

        fn final_at(target: &str) -> Arc<dyn UpgradeCatalog> {
            Arc::new(Self {
                target: target.to_string(),
                is_final: true,
            })
        }
    }

    #[async_trait::async_trait]
    impl UpgradeCatalog for MockCatalog {
        fn source_version(&self) -> Option<&str> {
            None
        }

        fn target_version(&self) -> &str {
            &self.target
        }

        fn is_final(&self) -> bool {
            self.is_final
        }

        fn description(&self) -> &str {
            "Mock catalog"
        }

        async fn run_schema_changes(&self, _ctx: &SchemaContext) -> Result<(), MigrationError> {
            Ok(())
        }

        async fn run_data_changes(&self, _ctx: &DataContext) -> Result<(), MigrationError> {
            Ok(())
        }
    }

    fn targets(path: &[Arc<dyn UpgradeCatalog>]) -> Vec<&str> {
        path.iter().map(|c| c.target_version()).collect()
    }

    fn sample() -> CatalogRegistry {
        CatalogRegistry::new(vec![
            MockCatalog::final_at("3.0"),
            MockCatalog::numbered("2.0"),
            MockCatalog::numbered("1.0"),
        ])
        .expect("Registry should build")
    }

    #[test]
    fn test_fresh_install_runs_everything() {
        let path = sample().resolve_path(None, "3.0").unwrap();
        assert_eq!(targets(&path), vec!["1.0", "2.0", "3.0"]);
    }

    #[test]
    fn test_partial_upgrade() {
        let path = sample().resolve_path(Some("1.0"), "2.0").unwrap();
        assert_eq!(targets(&path), vec!["2.0"]);
    }

    #[test]
    fn test_already_current_is_empty() {
        let path = sample().resolve_path(Some("3.0"), "3.0").unwrap();
        assert!(path.is_empty());
    }

    #[test]
    fn test_source_above_target_is_empty() {
        let path = sample().resolve_path(Some("2.0"), "1.0").unwrap();
        assert!(path.is_empty());
    }

    #[test]
    fn test_final_catalog_sorts_last() {
        let registry = CatalogRegistry::new(vec![
            MockCatalog::final_at("2.5"),
            MockCatalog::numbered("2.0"),
            MockCatalog::numbered("1.0"),
        ])
        .unwrap();

        let path = registry.resolve_path(None, "2.5").unwrap();
        assert_eq!(targets(&path), vec!["1.0", "2.0", "2.5"]);
        assert_eq!(registry.latest_version(), Some("2.5"));
        assert_eq!(registry.earliest_version(), Some("1.0"));
    }

    #[test]
    fn test_final_catalog_below_numbered_rejected() {
        let result = CatalogRegistry::new(vec![
            MockCatalog::numbered("1.0"),
            MockCatalog::numbered("3.0"),
            MockCatalog::final_at("2.5"),
        ]);
        match result {
            Err(RegistryError::FinalNotLatest {
                final_version,
                numbered,
            }) => {
                assert_eq!(final_version, "2.5");
                assert_eq!(numbered, "3.0");
            }
            Err(e) => panic!("Expected FinalNotLatest, got {}", e),
            Ok(_) => panic!("Expected FinalNotLatest, got a registry"),
        }
    }

    #[test]
    fn test_path_is_monotonic() {
        let registry = CatalogRegistry::new(vec![
            MockCatalog::numbered("1.10.0"),
            MockCatalog::numbered("1.2.0"),
            MockCatalog::numbered("1.9.3"),
            MockCatalog::numbered("2.0.0"),
        ])
        .unwrap();

        let path = registry.resolve_path(Some("1.2.0"), "2.0.0").unwrap();
        assert_eq!(targets(&path), vec!["1.9.3", "1.10.0", "2.0.0"]);
    }

    #[test]
    fn test_precision_truncates() {
        let registry = CatalogRegistry::new(vec![
            MockCatalog::numbered("2.0.0"),
            MockCatalog::numbered("2.1.0"),
        ])
        .unwrap();

        // 2.0.0.5 compares equal to 2.0.0 at three segments.
        let path = registry.resolve_path(Some("2.0.0.5"), "2.1.0").unwrap();
        assert_eq!(targets(&path), vec!["2.1.0"]);
    }

    #[test]
    fn test_duplicate_target_rejected() {
        let result = CatalogRegistry::new(vec![
            MockCatalog::numbered("2.0"),
            MockCatalog::numbered("2.0.0"),
        ]);
        assert!(matches!(result, Err(RegistryError::DuplicateTarget(_))));
    }

    #[test]
    fn test_two_final_catalogs_rejected() {
        let result = CatalogRegistry::new(vec![
            MockCatalog::final_at("3.0"),
            MockCatalog::final_at("4.0"),
        ]);
        assert!(matches!(result, Err(RegistryError::MultipleFinal(_, _))));
    }

    #[test]
    fn test_invalid_version_rejected() {
        let result = CatalogRegistry::new(vec![MockCatalog::numbered("two")]);
        assert!(matches!(result, Err(RegistryError::InvalidVersion(_))));

        assert!(sample().resolve_path(Some("x"), "3.0").is_err());
    }

    #[test]
    fn test_available_versions() {
        assert_eq!(sample().available_versions(), vec!["1.0", "2.0", "3.0"]);
        assert_eq!(sample().len(), 3);
    }
}
