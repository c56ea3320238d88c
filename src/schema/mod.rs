//! Raw schema access and idempotent schema primitives.
//!
//! Catalog schema phases only ever see this layer: it runs before the mapped
//! persistence layer is started, so nothing here depends on the shape of the
//! entity tables.

mod accessor;
mod primitives;
mod sqlite;
mod types;

pub use accessor::{SchemaAccessor, Statement};
pub use primitives::SchemaPrimitives;
pub use sqlite::SqliteAccessor;
pub use types::{
    AlterOp, Applied, ColumnInfo, ColumnType, FailurePolicy, ForeignKey, SchemaError, SchemaStep,
    SqlValue, TableDefinition,
};
