//! The final catalog runs after every numbered catalog and stamps the
//! version of this build.

use crate::migration::context::{DataContext, SchemaContext};
use crate::migration::types::{MigrationError, UpgradeCatalog};
use crate::version::TOOL_VERSION;
use async_trait::async_trait;

pub struct FinalCatalog;

impl FinalCatalog {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FinalCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpgradeCatalog for FinalCatalog {
    fn source_version(&self) -> Option<&str> {
        None
    }

    fn target_version(&self) -> &str {
        TOOL_VERSION
    }

    fn is_final(&self) -> bool {
        true
    }

    fn description(&self) -> &str {
        "Stamp the tool version"
    }

    async fn run_schema_changes(&self, _ctx: &SchemaContext) -> Result<(), MigrationError> {
        Ok(())
    }

    async fn run_data_changes(&self, _ctx: &DataContext) -> Result<(), MigrationError> {
        Ok(())
    }
}
