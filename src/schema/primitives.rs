//! Idempotent schema primitives.
//!
//! Every primitive probes the current schema first, skips with a debug log
//! when the end state already holds, and otherwise mutates. Callers can mark
//! a call ignorable, in which case a failing mutation is logged and reported
//! as [`Applied::IgnoredFailure`] instead of aborting the catalog.

use super::accessor::SchemaAccessor;
use super::types::{
    AlterOp, Applied, ColumnInfo, FailurePolicy, ForeignKey, SchemaError, SchemaStep, SqlValue,
    TableDefinition,
};
use crate::utils::{is_valid_identifier, SEQUENCE_TABLE};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Idempotent schema operations over a [`SchemaAccessor`].
#[derive(Clone)]
pub struct SchemaPrimitives {
    accessor: Arc<dyn SchemaAccessor>,
}

fn check_identifier(name: &str) -> Result<(), SchemaError> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier(name.to_string()))
    }
}

fn check_identifiers<S: AsRef<str>>(names: &[S]) -> Result<(), SchemaError> {
    if names.is_empty() {
        return Err(SchemaError::InvalidDefinition(
            "column list must not be empty".to_string(),
        ));
    }
    names.iter().try_for_each(|n| check_identifier(n.as_ref()))
}

impl SchemaPrimitives {
    pub fn new(accessor: Arc<dyn SchemaAccessor>) -> Self {
        Self { accessor }
    }

    pub fn accessor(&self) -> &Arc<dyn SchemaAccessor> {
        &self.accessor
    }

    /// Run a mutation, honoring the failure policy.
    async fn mutate(
        &self,
        operation: &'static str,
        table: &str,
        sql: &str,
        policy: FailurePolicy,
    ) -> Result<Applied, SchemaError> {
        match self.accessor.execute(sql, &[]).await {
            Ok(_) => {
                info!(operation, table, "Schema change applied");
                Ok(Applied::Changed)
            }
            Err(e) => self.on_failure(operation, table, e, policy),
        }
    }

    fn on_failure(
        &self,
        operation: &'static str,
        table: &str,
        error: sqlx::Error,
        policy: FailurePolicy,
    ) -> Result<Applied, SchemaError> {
        let error = SchemaError::from_mutation(operation, table, error);
        match policy {
            FailurePolicy::Ignore => {
                warn!(operation, table, error = %error, "Ignoring failed schema change");
                Ok(Applied::IgnoredFailure)
            }
            FailurePolicy::Propagate => Err(error),
        }
    }

    /// `ALTER TABLE ... ADD COLUMN` unless the column already exists.
    pub async fn add_column_if_absent(
        &self,
        table: &str,
        column: &ColumnInfo,
        policy: FailurePolicy,
    ) -> Result<Applied, SchemaError> {
        check_identifier(table)?;
        check_identifier(&column.name)?;

        if self.accessor.column_exists(table, &column.name).await? {
            debug!(table, column = %column.name, "Column already exists, skipping");
            return Ok(Applied::AlreadyPresent);
        }

        let sql = format!("ALTER TABLE {} ADD COLUMN {}", table, column.definition());
        self.mutate("add column", table, &sql, policy).await
    }

    /// Drop a column when it is still present.
    pub async fn drop_column_if_present(
        &self,
        table: &str,
        column: &str,
        policy: FailurePolicy,
    ) -> Result<Applied, SchemaError> {
        check_identifier(table)?;
        check_identifier(column)?;

        if !self.accessor.column_exists(table, column).await? {
            debug!(table, column, "Column already absent, skipping");
            return Ok(Applied::AlreadyPresent);
        }

        let sql = format!("ALTER TABLE {} DROP COLUMN {}", table, column);
        self.mutate("drop column", table, &sql, policy).await
    }

    /// Rename `from` to `to` unless the rename already happened.
    pub async fn rename_column_if_present(
        &self,
        table: &str,
        from: &str,
        to: &str,
        policy: FailurePolicy,
    ) -> Result<Applied, SchemaError> {
        check_identifier(table)?;
        check_identifier(from)?;
        check_identifier(to)?;

        let has_from = self.accessor.column_exists(table, from).await?;
        if self.accessor.column_exists(table, to).await? {
            // An earlier catalog re-ran and added `from` back after the rename.
            if has_from && !self.column_has_data(table, from).await? {
                debug!(table, from, to, "Dropping re-created empty column");
                self.drop_column_if_present(table, from, policy).await?;
            }
            debug!(table, from, to, "Column already renamed, skipping");
            return Ok(Applied::AlreadyPresent);
        }
        if !has_from {
            return self.on_failure(
                "rename column",
                table,
                sqlx::Error::Protocol(format!("column {} not found on {}", from, table)),
                policy,
            );
        }

        let sql = format!("ALTER TABLE {} RENAME COLUMN {} TO {}", table, from, to);
        self.mutate("rename column", table, &sql, policy).await
    }

    /// Insert a row into the sequence table unless the sequence exists.
    pub async fn add_sequence_if_absent(
        &self,
        name: &str,
        initial_value: i64,
        policy: FailurePolicy,
    ) -> Result<Applied, SchemaError> {
        let existing = self
            .accessor
            .count(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE sequence_name = ?",
                    SEQUENCE_TABLE
                ),
                &[name.into()],
            )
            .await?;

        if existing > 0 {
            debug!(sequence = name, "Sequence already exists, skipping");
            return Ok(Applied::AlreadyPresent);
        }

        let result = self
            .accessor
            .execute(
                &format!(
                    "INSERT INTO {} (sequence_name, sequence_value) VALUES (?, ?)",
                    SEQUENCE_TABLE
                ),
                &[name.into(), SqlValue::Integer(initial_value)],
            )
            .await;

        match result {
            Ok(_) => {
                info!(sequence = name, initial_value, "Sequence added");
                Ok(Applied::Changed)
            }
            Err(e) => self.on_failure("add sequence", SEQUENCE_TABLE, e, policy),
        }
    }

    /// Add several sequences sharing one initial value.
    pub async fn add_sequences_if_absent(
        &self,
        names: &[&str],
        initial_value: i64,
        policy: FailurePolicy,
    ) -> Result<Vec<Applied>, SchemaError> {
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            results.push(self.add_sequence_if_absent(name, initial_value, policy).await?);
        }
        Ok(results)
    }

    /// Set a sequence to one past the highest value of `table.column`,
    /// creating the sequence when needed. Returns the new sequence value.
    pub async fn sync_sequence(
        &self,
        name: &str,
        table: &str,
        column: &str,
    ) -> Result<i64, SchemaError> {
        check_identifier(table)?;
        check_identifier(column)?;

        let max = self
            .accessor
            .fetch_value(&format!("SELECT MAX({}) FROM {}", column, table), &[])
            .await?
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let next = max + 1;

        self.add_sequence_if_absent(name, next, FailurePolicy::Propagate)
            .await?;
        self.accessor
            .execute(
                &format!(
                    "UPDATE {} SET sequence_value = ? WHERE sequence_name = ? AND sequence_value < ?",
                    SEQUENCE_TABLE
                ),
                &[SqlValue::Integer(next), name.into(), SqlValue::Integer(next)],
            )
            .await
            .map_err(|e| SchemaError::from_mutation("sync sequence", SEQUENCE_TABLE, e))?;

        info!(sequence = name, table, column, value = next, "Sequence synchronized");
        Ok(next)
    }

    /// `CREATE TABLE` unless the table exists.
    pub async fn add_table_if_absent(
        &self,
        table: &TableDefinition,
        policy: FailurePolicy,
    ) -> Result<Applied, SchemaError> {
        check_identifier(&table.name)?;
        if table.columns.is_empty() {
            return Err(SchemaError::InvalidDefinition(format!(
                "table {} has no columns",
                table.name
            )));
        }
        for column in &table.columns {
            check_identifier(&column.name)?;
        }
        for column in &table.primary_key {
            check_identifier(column)?;
        }

        if self.accessor.table_exists(&table.name).await? {
            debug!(table = %table.name, "Table already exists, skipping");
            return Ok(Applied::AlreadyPresent);
        }

        let mut clauses: Vec<String> = table.columns.iter().map(ColumnInfo::definition).collect();
        if !table.primary_key.is_empty() {
            clauses.push(format!("PRIMARY KEY ({})", table.primary_key.join(", ")));
        }
        let sql = format!("CREATE TABLE {} ({})", table.name, clauses.join(", "));

        self.mutate("create table", &table.name, &sql, policy).await
    }

    pub async fn drop_table_if_exists(
        &self,
        table: &str,
        policy: FailurePolicy,
    ) -> Result<Applied, SchemaError> {
        check_identifier(table)?;

        if !self.accessor.table_exists(table).await? {
            debug!(table, "Table already absent, skipping");
            return Ok(Applied::AlreadyPresent);
        }

        self.mutate("drop table", table, &format!("DROP TABLE {}", table), policy)
            .await
    }

    /// Add a named unique constraint unless one with that name exists.
    pub async fn add_unique_constraint_if_absent(
        &self,
        table: &str,
        name: &str,
        columns: &[String],
        policy: FailurePolicy,
    ) -> Result<Applied, SchemaError> {
        check_identifier(table)?;
        check_identifier(name)?;
        check_identifiers(columns)?;

        if self.accessor.index_exists(name).await? {
            debug!(table, constraint = name, "Unique constraint already exists, skipping");
            return Ok(Applied::AlreadyPresent);
        }

        let sql = format!(
            "CREATE UNIQUE INDEX {} ON {} ({})",
            name,
            table,
            columns.join(", ")
        );
        self.mutate("add unique constraint", table, &sql, policy).await
    }

    /// Add a foreign key unless an equivalent one exists.
    pub async fn add_foreign_key_if_absent(
        &self,
        table: &str,
        foreign_key: &ForeignKey,
        policy: FailurePolicy,
    ) -> Result<Applied, SchemaError> {
        check_identifier(table)?;
        check_identifier(&foreign_key.name)?;
        check_identifier(&foreign_key.referenced_table)?;
        check_identifiers(&foreign_key.columns)?;
        check_identifiers(&foreign_key.referenced_columns)?;
        if foreign_key.columns.len() != foreign_key.referenced_columns.len() {
            return Err(SchemaError::InvalidDefinition(format!(
                "foreign key {} maps {} columns onto {}",
                foreign_key.name,
                foreign_key.columns.len(),
                foreign_key.referenced_columns.len()
            )));
        }

        if self.accessor.foreign_key_exists(table, foreign_key).await? {
            debug!(table, constraint = %foreign_key.name, "Foreign key already exists, skipping");
            return Ok(Applied::AlreadyPresent);
        }

        match self.accessor.add_foreign_key(table, foreign_key).await {
            Ok(()) => {
                info!(table, constraint = %foreign_key.name, "Foreign key added");
                Ok(Applied::Changed)
            }
            Err(e) => self.on_failure("add foreign key", table, e, policy),
        }
    }

    pub async fn create_index_if_absent(
        &self,
        table: &str,
        name: &str,
        columns: &[String],
        policy: FailurePolicy,
    ) -> Result<Applied, SchemaError> {
        check_identifier(table)?;
        check_identifier(name)?;
        check_identifiers(columns)?;

        if self.accessor.index_exists(name).await? {
            debug!(table, index = name, "Index already exists, skipping");
            return Ok(Applied::AlreadyPresent);
        }

        let sql = format!("CREATE INDEX {} ON {} ({})", name, table, columns.join(", "));
        self.mutate("create index", table, &sql, policy).await
    }

    pub async fn table_has_data(&self, table: &str) -> Result<bool, SchemaError> {
        check_identifier(table)?;
        if !self.accessor.table_exists(table).await? {
            return Ok(false);
        }
        let count = self
            .accessor
            .count(&format!("SELECT COUNT(*) FROM (SELECT 1 FROM {} LIMIT 1)", table), &[])
            .await?;
        Ok(count > 0)
    }

    async fn column_has_data(&self, table: &str, column: &str) -> Result<bool, SchemaError> {
        let sql = format!(
            "SELECT COUNT(*) FROM (SELECT 1 FROM {} WHERE {} IS NOT NULL LIMIT 1)",
            table, column
        );
        Ok(self.accessor.count(&sql, &[]).await? > 0)
    }

    /// Apply one typed operation.
    pub async fn apply(&self, step: &SchemaStep) -> Result<Applied, SchemaError> {
        let policy = step.policy;
        match &step.op {
            AlterOp::CreateTable(table) => self.add_table_if_absent(table, policy).await,
            AlterOp::DropTable { table } => self.drop_table_if_exists(table, policy).await,
            AlterOp::AddColumn { table, column } => {
                self.add_column_if_absent(table, column, policy).await
            }
            AlterOp::DropColumn { table, column } => {
                self.drop_column_if_present(table, column, policy).await
            }
            AlterOp::RenameColumn { table, from, to } => {
                self.rename_column_if_present(table, from, to, policy).await
            }
            AlterOp::AddSequence {
                name,
                initial_value,
            } => self.add_sequence_if_absent(name, *initial_value, policy).await,
            AlterOp::AddUniqueConstraint {
                table,
                name,
                columns,
            } => {
                self.add_unique_constraint_if_absent(table, name, columns, policy)
                    .await
            }
            AlterOp::AddForeignKey { table, foreign_key } => {
                self.add_foreign_key_if_absent(table, foreign_key, policy).await
            }
            AlterOp::CreateIndex {
                table,
                name,
                columns,
            } => self.create_index_if_absent(table, name, columns, policy).await,
        }
    }

    /// Apply a list of typed operations in order.
    pub async fn apply_all(&self, steps: &[SchemaStep]) -> Result<Vec<Applied>, SchemaError> {
        let mut results = Vec::with_capacity(steps.len());
        for step in steps {
            results.push(self.apply(step).await?);
        }
        Ok(results)
    }
}
