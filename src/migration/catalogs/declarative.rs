//! Catalogs expressed as data: a list of schema steps plus a list of data
//! steps, executed in order.

use crate::cluster::ConfigUpdate;
use crate::migration::context::{DataContext, SchemaContext};
use crate::migration::types::{MigrationError, UpgradeCatalog};
use crate::schema::{SchemaStep, SqlValue};
use async_trait::async_trait;

/// One data-phase operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DataStep {
    /// Raw statement; invalidates the store cache.
    Sql { sql: String, args: Vec<SqlValue> },
    SyncSequence {
        name: String,
        table: String,
        column: String,
    },
    Reconcile(ConfigUpdate),
}

impl DataStep {
    pub fn sql(sql: impl Into<String>) -> Self {
        DataStep::Sql {
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    pub fn sync_sequence(name: &str, table: &str, column: &str) -> Self {
        DataStep::SyncSequence {
            name: name.to_string(),
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    async fn run(&self, ctx: &DataContext) -> Result<(), MigrationError> {
        match self {
            DataStep::Sql { sql, args } => {
                ctx.execute_raw(sql, args).await?;
            }
            DataStep::SyncSequence {
                name,
                table,
                column,
            } => {
                ctx.sync_sequence(name, table, column).await?;
            }
            DataStep::Reconcile(update) => {
                ctx.reconcile_all(update).await?;
            }
        }
        Ok(())
    }
}

/// A catalog built from operation lists.
#[derive(Debug, Clone)]
pub struct DeclarativeCatalog {
    source: Option<String>,
    target: String,
    description: String,
    schema: Vec<SchemaStep>,
    pre_data: Vec<DataStep>,
    data: Vec<DataStep>,
}

impl DeclarativeCatalog {
    pub fn new(source: Option<&str>, target: &str, description: &str) -> Self {
        Self {
            source: source.map(str::to_string),
            target: target.to_string(),
            description: description.to_string(),
            schema: Vec::new(),
            pre_data: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn schema(mut self, step: impl Into<SchemaStep>) -> Self {
        self.schema.push(step.into());
        self
    }

    pub fn pre_data(mut self, step: DataStep) -> Self {
        self.pre_data.push(step);
        self
    }

    pub fn data(mut self, step: DataStep) -> Self {
        self.data.push(step);
        self
    }

    pub fn schema_steps(&self) -> &[SchemaStep] {
        &self.schema
    }

    pub fn data_steps(&self) -> &[DataStep] {
        &self.data
    }
}

#[async_trait]
impl UpgradeCatalog for DeclarativeCatalog {
    fn source_version(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn target_version(&self) -> &str {
        &self.target
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run_schema_changes(&self, ctx: &SchemaContext) -> Result<(), MigrationError> {
        ctx.apply_all(&self.schema).await
    }

    async fn run_pre_data_changes(&self, ctx: &DataContext) -> Result<(), MigrationError> {
        for step in &self.pre_data {
            step.run(ctx).await?;
        }
        Ok(())
    }

    async fn run_data_changes(&self, ctx: &DataContext) -> Result<(), MigrationError> {
        for step in &self.data {
            step.run(ctx).await?;
        }
        Ok(())
    }
}
