//! Single-writer advisory lock held for the duration of an upgrade.

use super::types::UpgradeError;
use crate::schema::{
    ColumnInfo, ColumnType, FailurePolicy, SchemaError, SchemaPrimitives, SqlValue,
    TableDefinition,
};
use crate::utils::{now_iso, LOCK_TABLE};
use tracing::{info, warn};
use uuid::Uuid;

const LOCK_ID: i64 = 1;

fn lock_table() -> TableDefinition {
    TableDefinition::new(LOCK_TABLE)
        .column(ColumnInfo::new("lock_id", ColumnType::Integer).not_null())
        .column(ColumnInfo::new("holder", ColumnType::Varchar(64)).not_null())
        .column(ColumnInfo::new("acquired_at", ColumnType::Varchar(64)).not_null())
        .primary_key(&["lock_id"])
}

/// A held lock. Release it explicitly; a crashed run leaves the row behind
/// until [`UpgradeLock::break_lock`] removes it.
#[derive(Debug)]
pub struct UpgradeLock {
    holder: String,
}

impl UpgradeLock {
    pub async fn acquire(primitives: &SchemaPrimitives) -> Result<Self, UpgradeError> {
        primitives
            .add_table_if_absent(&lock_table(), FailurePolicy::Propagate)
            .await?;

        let holder = Uuid::new_v4().to_string();
        let inserted = primitives
            .accessor()
            .execute(
                &format!(
                    "INSERT INTO {} (lock_id, holder, acquired_at) VALUES (?, ?, ?) \
                     ON CONFLICT(lock_id) DO NOTHING",
                    LOCK_TABLE
                ),
                &[
                    SqlValue::Integer(LOCK_ID),
                    holder.as_str().into(),
                    now_iso().into(),
                ],
            )
            .await
            .map_err(|e| SchemaError::from_mutation("acquire lock", LOCK_TABLE, e))?;

        if inserted == 0 {
            let row = primitives
                .accessor()
                .fetch_all(
                    &format!("SELECT holder, acquired_at FROM {} WHERE lock_id = ?", LOCK_TABLE),
                    &[SqlValue::Integer(LOCK_ID)],
                )
                .await
                .map_err(SchemaError::from)?
                .into_iter()
                .next()
                .unwrap_or_default();

            let field = |i: usize| {
                row.get(i)
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string()
            };
            return Err(UpgradeError::Locked {
                holder: field(0),
                acquired_at: field(1),
            });
        }

        info!(holder = %holder, "Upgrade lock acquired");
        Ok(Self { holder })
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub async fn release(self, primitives: &SchemaPrimitives) -> Result<(), SchemaError> {
        let removed = primitives
            .accessor()
            .execute(
                &format!("DELETE FROM {} WHERE lock_id = ? AND holder = ?", LOCK_TABLE),
                &[SqlValue::Integer(LOCK_ID), self.holder.as_str().into()],
            )
            .await
            .map_err(|e| SchemaError::from_mutation("release lock", LOCK_TABLE, e))?;

        if removed == 0 {
            warn!(holder = %self.holder, "Upgrade lock was already gone on release");
        } else {
            info!(holder = %self.holder, "Upgrade lock released");
        }
        Ok(())
    }

    /// Remove a stale lock left by a crashed run. Returns whether a lock was
    /// present.
    pub async fn break_lock(primitives: &SchemaPrimitives) -> Result<bool, SchemaError> {
        if !primitives.accessor().table_exists(LOCK_TABLE).await? {
            return Ok(false);
        }

        let removed = primitives
            .accessor()
            .execute(&format!("DELETE FROM {}", LOCK_TABLE), &[])
            .await
            .map_err(|e| SchemaError::from_mutation("break lock", LOCK_TABLE, e))?;

        if removed > 0 {
            warn!("Stale upgrade lock removed");
        }
        Ok(removed > 0)
    }
}
