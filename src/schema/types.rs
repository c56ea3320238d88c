//! Types for the schema primitive layer.

use crate::utils::quote_literal;
use std::fmt;
use thiserror::Error;

/// Error types for schema operations.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{operation} on table {table} failed: {source}")]
    MutationFailed {
        operation: &'static str,
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("{operation} on table {table} failed: object already exists")]
    AlreadyExists {
        operation: &'static str,
        table: String,
    },

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),
}

impl SchemaError {
    /// Classify a failed mutation. Backends report duplicate objects through
    /// their error text only.
    pub fn from_mutation(operation: &'static str, table: &str, source: sqlx::Error) -> Self {
        let duplicate = match &source {
            sqlx::Error::Database(db) => {
                let message = db.message().to_ascii_lowercase();
                message.contains("already exists") || message.contains("duplicate column")
            }
            _ => false,
        };

        if duplicate {
            SchemaError::AlreadyExists {
                operation,
                table: table.to_string(),
            }
        } else {
            SchemaError::MutationFailed {
                operation,
                table: table.to_string(),
                source,
            }
        }
    }
}

/// A bindable SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Text(String),
}

impl SqlValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            SqlValue::Text(s) => s.parse().ok(),
            SqlValue::Null => None,
        }
    }

    /// Render as a SQL literal for DDL default clauses.
    pub fn to_literal(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Integer(i) => i.to_string(),
            SqlValue::Text(s) => quote_literal(s),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Integer(i64::from(value))
    }
}

/// Column types the primitives know how to declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    BigInt,
    Varchar(u32),
    Text,
    Boolean,
    Timestamp,
    Blob,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Integer => f.write_str("INTEGER"),
            ColumnType::BigInt => f.write_str("BIGINT"),
            ColumnType::Varchar(len) => write!(f, "VARCHAR({})", len),
            ColumnType::Text => f.write_str("TEXT"),
            ColumnType::Boolean => f.write_str("SMALLINT"),
            ColumnType::Timestamp => f.write_str("TIMESTAMP"),
            ColumnType::Blob => f.write_str("BLOB"),
        }
    }
}

/// Column definition used by table and column primitives.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub default: Option<SqlValue>,
}

impl ColumnInfo {
    /// A nullable column without a default.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, value: impl Into<SqlValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Column clause as it appears in CREATE TABLE / ADD COLUMN.
    pub fn definition(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.column_type);
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default.to_literal());
        }
        if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        sql
    }
}

/// Table definition for `add_table_if_absent`.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Vec<String>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnInfo) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }
}

/// Foreign key definition for `add_foreign_key_if_absent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

impl ForeignKey {
    pub fn new(
        name: impl Into<String>,
        columns: &[&str],
        referenced_table: impl Into<String>,
        referenced_columns: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            referenced_table: referenced_table.into(),
            referenced_columns: referenced_columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Constraint clause appended to a table definition.
    pub fn clause(&self) -> String {
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.name,
            self.columns.join(", "),
            self.referenced_table,
            self.referenced_columns.join(", ")
        )
    }
}

/// Whether a failing mutation aborts the catalog or is logged and skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    #[default]
    Propagate,
    Ignore,
}

/// Result of an idempotent primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The mutation ran.
    Changed,
    /// The end state already held; nothing ran.
    AlreadyPresent,
    /// The mutation failed and the caller asked for the failure to be ignored.
    IgnoredFailure,
}

/// A typed schema operation, so that most catalogs are plain data.
#[derive(Debug, Clone, PartialEq)]
pub enum AlterOp {
    CreateTable(TableDefinition),
    DropTable {
        table: String,
    },
    AddColumn {
        table: String,
        column: ColumnInfo,
    },
    DropColumn {
        table: String,
        column: String,
    },
    RenameColumn {
        table: String,
        from: String,
        to: String,
    },
    AddSequence {
        name: String,
        initial_value: i64,
    },
    AddUniqueConstraint {
        table: String,
        name: String,
        columns: Vec<String>,
    },
    AddForeignKey {
        table: String,
        foreign_key: ForeignKey,
    },
    CreateIndex {
        table: String,
        name: String,
        columns: Vec<String>,
    },
}

impl AlterOp {
    pub fn add_column(table: &str, column: ColumnInfo) -> Self {
        AlterOp::AddColumn {
            table: table.to_string(),
            column,
        }
    }

    pub fn rename_column(table: &str, from: &str, to: &str) -> Self {
        AlterOp::RenameColumn {
            table: table.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn add_sequence(name: &str, initial_value: i64) -> Self {
        AlterOp::AddSequence {
            name: name.to_string(),
            initial_value,
        }
    }

    pub fn add_unique(table: &str, name: &str, columns: &[&str]) -> Self {
        AlterOp::AddUniqueConstraint {
            table: table.to_string(),
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn add_foreign_key(table: &str, foreign_key: ForeignKey) -> Self {
        AlterOp::AddForeignKey {
            table: table.to_string(),
            foreign_key,
        }
    }

    pub fn create_index(table: &str, name: &str, columns: &[&str]) -> Self {
        AlterOp::CreateIndex {
            table: table.to_string(),
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// An operation plus its failure policy.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaStep {
    pub op: AlterOp,
    pub policy: FailurePolicy,
}

impl SchemaStep {
    pub fn new(op: AlterOp) -> Self {
        Self {
            op,
            policy: FailurePolicy::Propagate,
        }
    }

    /// Mark the step ignorable, for probes that are unreliable on some
    /// backends.
    pub fn ignore_failure(mut self) -> Self {
        self.policy = FailurePolicy::Ignore;
        self
    }
}

impl From<AlterOp> for SchemaStep {
    fn from(op: AlterOp) -> Self {
        SchemaStep::new(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_definition() {
        let column = ColumnInfo::new("consecutive_failures", ColumnType::Integer)
            .default_value(0)
            .not_null();
        assert_eq!(
            column.definition(),
            "consecutive_failures INTEGER DEFAULT 0 NOT NULL"
        );

        let column = ColumnInfo::new("display_name", ColumnType::Varchar(255)).default_value("n/a");
        assert_eq!(column.definition(), "display_name VARCHAR(255) DEFAULT 'n/a'");
    }

    #[test]
    fn test_foreign_key_clause() {
        let fk = ForeignKey::new("FK_cfg_cluster", &["cluster_id"], "clusters", &["cluster_id"]);
        assert_eq!(
            fk.clause(),
            "CONSTRAINT FK_cfg_cluster FOREIGN KEY (cluster_id) REFERENCES clusters (cluster_id)"
        );
    }

    #[test]
    fn test_sql_value_conversions() {
        assert_eq!(SqlValue::from("7").as_i64(), Some(7));
        assert_eq!(SqlValue::Integer(3).as_str(), None);
        assert_eq!(SqlValue::Null.to_literal(), "NULL");
    }
}
