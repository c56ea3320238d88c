//! Reading and writing the database version stamp.

use crate::schema::{
    ColumnInfo, ColumnType, FailurePolicy, SchemaAccessor, SchemaError, SchemaPrimitives,
    TableDefinition,
};
use crate::utils::{METAINFO_TABLE, VERSION_KEY};
use tracing::info;

/// Definition of the key/value metadata table that holds the stamp.
pub fn metainfo_table() -> TableDefinition {
    TableDefinition::new(METAINFO_TABLE)
        .column(ColumnInfo::new("metainfo_key", ColumnType::Varchar(255)).not_null())
        .column(ColumnInfo::new("metainfo_value", ColumnType::Text))
        .primary_key(&["metainfo_key"])
}

/// The stamped version, or `None` for a database that was never stamped.
pub async fn read_stamp(accessor: &dyn SchemaAccessor) -> Result<Option<String>, SchemaError> {
    if !accessor.table_exists(METAINFO_TABLE).await? {
        return Ok(None);
    }

    let value = accessor
        .fetch_value(
            &format!(
                "SELECT metainfo_value FROM {} WHERE metainfo_key = ?",
                METAINFO_TABLE
            ),
            &[VERSION_KEY.into()],
        )
        .await?;

    Ok(value
        .and_then(|v| v.as_str().map(str::to_string))
        .filter(|v| !v.trim().is_empty()))
}

/// Record `version` as the stamp in its own transaction.
pub async fn write_stamp(primitives: &SchemaPrimitives, version: &str) -> Result<(), SchemaError> {
    primitives
        .add_table_if_absent(&metainfo_table(), FailurePolicy::Propagate)
        .await?;

    primitives
        .accessor()
        .execute_atomic(&[(
            format!(
                "INSERT INTO {} (metainfo_key, metainfo_value) VALUES (?, ?) \
                 ON CONFLICT(metainfo_key) DO UPDATE SET metainfo_value = excluded.metainfo_value",
                METAINFO_TABLE
            ),
            vec![VERSION_KEY.into(), version.into()],
        )])
        .await
        .map_err(|e| SchemaError::from_mutation("stamp version", METAINFO_TABLE, e))?;

    info!(version, "Version stamp written");
    Ok(())
}
