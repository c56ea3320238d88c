//! Raw schema access seam.

use super::types::{ForeignKey, SqlValue};
use async_trait::async_trait;
use tracing::warn;

/// A statement with its bound arguments.
pub type Statement = (String, Vec<SqlValue>);

/// Raw, unmapped access to the database.
///
/// Implementations own the backend-specific catalog views used by the
/// existence probes. Everything above this trait is backend independent.
#[async_trait]
pub trait SchemaAccessor: Send + Sync {
    /// Execute a single statement and return the affected row count.
    async fn execute(&self, sql: &str, args: &[SqlValue]) -> Result<u64, sqlx::Error>;

    /// Run a query and decode every column of every row.
    async fn fetch_all(&self, sql: &str, args: &[SqlValue])
        -> Result<Vec<Vec<SqlValue>>, sqlx::Error>;

    async fn table_exists(&self, table: &str) -> Result<bool, sqlx::Error>;

    async fn column_exists(&self, table: &str, column: &str) -> Result<bool, sqlx::Error>;

    async fn index_exists(&self, name: &str) -> Result<bool, sqlx::Error>;

    async fn foreign_key_exists(&self, table: &str, foreign_key: &ForeignKey)
        -> Result<bool, sqlx::Error>;

    /// Attach a foreign key to an existing table.
    async fn add_foreign_key(&self, table: &str, foreign_key: &ForeignKey)
        -> Result<(), sqlx::Error>;

    /// First column of the first row, if any.
    async fn fetch_value(&self, sql: &str, args: &[SqlValue]) -> Result<Option<SqlValue>, sqlx::Error> {
        let rows = self.fetch_all(sql, args).await?;
        Ok(rows.into_iter().next().and_then(|row| row.into_iter().next()))
    }

    /// Run a `SELECT COUNT(*)`-style query.
    async fn count(&self, sql: &str, args: &[SqlValue]) -> Result<i64, sqlx::Error> {
        Ok(self
            .fetch_value(sql, args)
            .await?
            .and_then(|v| v.as_i64())
            .unwrap_or(0))
    }

    async fn begin(&self) -> Result<(), sqlx::Error> {
        self.execute("BEGIN", &[]).await.map(|_| ())
    }

    async fn commit(&self) -> Result<(), sqlx::Error> {
        self.execute("COMMIT", &[]).await.map(|_| ())
    }

    async fn rollback(&self) -> Result<(), sqlx::Error> {
        self.execute("ROLLBACK", &[]).await.map(|_| ())
    }

    /// Run statements all-or-nothing inside a savepoint, which nests inside
    /// an enclosing transaction when there is one.
    async fn execute_atomic(&self, statements: &[Statement]) -> Result<(), sqlx::Error> {
        self.execute("SAVEPOINT atomic_batch", &[]).await?;

        for (sql, args) in statements {
            if let Err(e) = self.execute(sql, args).await {
                if let Err(rollback_err) =
                    self.execute("ROLLBACK TO SAVEPOINT atomic_batch", &[]).await
                {
                    warn!(error = %rollback_err, "Failed to roll back savepoint");
                }
                if let Err(release_err) = self.execute("RELEASE SAVEPOINT atomic_batch", &[]).await {
                    warn!(error = %release_err, "Failed to release savepoint");
                }
                return Err(e);
            }
        }

        self.execute("RELEASE SAVEPOINT atomic_batch", &[]).await?;
        Ok(())
    }
}
