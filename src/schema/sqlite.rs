//! SQLite backend for the schema accessor.

use super::accessor::{SchemaAccessor, Statement};
use super::types::{ForeignKey, SqlValue};
use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{ConnectOptions, Connection, Row, TypeInfo, ValueRef};
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::debug;

/// Schema accessor over a single SQLite connection.
///
/// One connection keeps explicit transactions and savepoints on the same
/// session, which the single-writer upgrade run relies on.
pub struct SqliteAccessor {
    conn: Mutex<SqliteConnection>,
}

impl SqliteAccessor {
    /// Open (creating if missing) the database at `url`, e.g.
    /// `sqlite://clusterdb.sqlite` or `sqlite::memory:`.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        // Foreign keys stay off: table rebuilds drop and recreate tables that
        // other tables reference.
        let conn = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(false)
            .connect()
            .await?;

        debug!(url, "Opened database connection");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        Self::connect("sqlite::memory:").await
    }

    /// Close the underlying connection.
    pub async fn close(self) -> Result<(), sqlx::Error> {
        self.conn.into_inner().close().await
    }
}

fn bind_args<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    args: &'q [SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for arg in args {
        query = match arg {
            SqlValue::Null => query.bind(None::<i64>),
            SqlValue::Integer(i) => query.bind(*i),
            SqlValue::Text(s) => query.bind(s.as_str()),
        };
    }
    query
}

fn decode_row(row: &SqliteRow) -> Result<Vec<SqlValue>, sqlx::Error> {
    let mut values = Vec::with_capacity(row.len());

    for i in 0..row.len() {
        let raw = row.try_get_raw(i)?;
        if raw.is_null() {
            values.push(SqlValue::Null);
            continue;
        }

        let type_name = raw.type_info().name().to_string();
        let value = match type_name.as_str() {
            "INTEGER" | "BOOLEAN" => SqlValue::Integer(row.try_get::<i64, _>(i)?),
            "REAL" => SqlValue::Text(row.try_get::<f64, _>(i)?.to_string()),
            "BLOB" => {
                let bytes: Vec<u8> = row.try_get(i)?;
                SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned())
            }
            _ => SqlValue::Text(row.try_get::<String, _>(i)?),
        };
        values.push(value);
    }

    Ok(values)
}

#[async_trait]
impl SchemaAccessor for SqliteAccessor {
    async fn execute(&self, sql: &str, args: &[SqlValue]) -> Result<u64, sqlx::Error> {
        let mut conn = self.conn.lock().await;
        let result = bind_args(sqlx::query(sql), args).execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }

    async fn fetch_all(
        &self,
        sql: &str,
        args: &[SqlValue],
    ) -> Result<Vec<Vec<SqlValue>>, sqlx::Error> {
        let mut conn = self.conn.lock().await;
        let rows = bind_args(sqlx::query(sql), args).fetch_all(&mut *conn).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn table_exists(&self, table: &str) -> Result<bool, sqlx::Error> {
        let count = self
            .count(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND lower(name) = lower(?)",
                &[table.into()],
            )
            .await?;
        Ok(count > 0)
    }

    async fn column_exists(&self, table: &str, column: &str) -> Result<bool, sqlx::Error> {
        let count = self
            .count(
                "SELECT COUNT(*) FROM pragma_table_info(?) WHERE lower(name) = lower(?)",
                &[table.into(), column.into()],
            )
            .await?;
        Ok(count > 0)
    }

    async fn index_exists(&self, name: &str) -> Result<bool, sqlx::Error> {
        let count = self
            .count(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND lower(name) = lower(?)",
                &[name.into()],
            )
            .await?;
        Ok(count > 0)
    }

    async fn foreign_key_exists(
        &self,
        table: &str,
        foreign_key: &ForeignKey,
    ) -> Result<bool, sqlx::Error> {
        // SQLite does not keep constraint names, so match on shape.
        let Some(first_column) = foreign_key.columns.first() else {
            return Ok(false);
        };
        let count = self
            .count(
                "SELECT COUNT(*) FROM pragma_foreign_key_list(?) \
                 WHERE lower(\"table\") = lower(?) AND lower(\"from\") = lower(?)",
                &[
                    table.into(),
                    foreign_key.referenced_table.as_str().into(),
                    first_column.as_str().into(),
                ],
            )
            .await?;
        Ok(count > 0)
    }

    async fn add_foreign_key(
        &self,
        table: &str,
        foreign_key: &ForeignKey,
    ) -> Result<(), sqlx::Error> {
        // No ALTER TABLE ADD CONSTRAINT in SQLite: rebuild the table with the
        // constraint appended, copying rows and recreating indexes.
        let create_sql = self
            .fetch_value(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND lower(name) = lower(?)",
                &[table.into()],
            )
            .await?
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| sqlx::Error::Protocol(format!("table {} not found", table)))?;

        let (Some(open), Some(close)) = (create_sql.find('('), create_sql.rfind(')')) else {
            return Err(sqlx::Error::Protocol(format!(
                "cannot parse definition of table {}",
                table
            )));
        };

        let index_sql: Vec<String> = self
            .fetch_all(
                "SELECT sql FROM sqlite_master \
                 WHERE type = 'index' AND lower(tbl_name) = lower(?) AND sql IS NOT NULL",
                &[table.into()],
            )
            .await?
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();

        let rebuilt = format!("{}__rebuild", table);
        let mut statements: Vec<Statement> = vec![
            (
                format!(
                    "CREATE TABLE {} {}, {})",
                    rebuilt,
                    &create_sql[open..close],
                    foreign_key.clause()
                ),
                vec![],
            ),
            (format!("INSERT INTO {} SELECT * FROM {}", rebuilt, table), vec![]),
            (format!("DROP TABLE {}", table), vec![]),
            (format!("ALTER TABLE {} RENAME TO {}", rebuilt, table), vec![]),
        ];
        statements.extend(index_sql.into_iter().map(|sql| (sql, vec![])));

        self.execute_atomic(&statements).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_all_decodes_types() {
        let db = SqliteAccessor::in_memory().await.unwrap();
        db.execute("CREATE TABLE t (id INTEGER, name TEXT, note TEXT)", &[])
            .await
            .unwrap();
        db.execute(
            "INSERT INTO t (id, name, note) VALUES (?, ?, ?)",
            &[SqlValue::Integer(7), "seven".into(), SqlValue::Null],
        )
        .await
        .unwrap();

        let rows = db.fetch_all("SELECT id, name, note FROM t", &[]).await.unwrap();
        assert_eq!(
            rows,
            vec![vec![SqlValue::Integer(7), "seven".into(), SqlValue::Null]]
        );
    }

    #[tokio::test]
    async fn test_probes() {
        let db = SqliteAccessor::in_memory().await.unwrap();
        db.execute("CREATE TABLE hosts (host_id INTEGER PRIMARY KEY, host_name TEXT)", &[])
            .await
            .unwrap();
        db.execute("CREATE INDEX IDX_host_name ON hosts (host_name)", &[])
            .await
            .unwrap();

        assert!(db.table_exists("hosts").await.unwrap());
        assert!(db.table_exists("HOSTS").await.unwrap());
        assert!(!db.table_exists("users").await.unwrap());
        assert!(db.column_exists("hosts", "host_name").await.unwrap());
        assert!(!db.column_exists("hosts", "rack").await.unwrap());
        assert!(db.index_exists("idx_host_name").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_foreign_key_rebuild_keeps_rows_and_indexes() {
        let db = SqliteAccessor::in_memory().await.unwrap();
        db.execute("CREATE TABLE clusters (cluster_id INTEGER PRIMARY KEY)", &[])
            .await
            .unwrap();
        db.execute(
            "CREATE TABLE hosts (host_id INTEGER PRIMARY KEY, cluster_id INTEGER, host_name TEXT)",
            &[],
        )
        .await
        .unwrap();
        db.execute("CREATE UNIQUE INDEX UQ_host_name ON hosts (host_name)", &[])
            .await
            .unwrap();
        db.execute(
            "INSERT INTO hosts (host_id, cluster_id, host_name) VALUES (1, 1, 'h1')",
            &[],
        )
        .await
        .unwrap();

        let fk = ForeignKey::new("FK_hosts_cluster", &["cluster_id"], "clusters", &["cluster_id"]);
        assert!(!db.foreign_key_exists("hosts", &fk).await.unwrap());

        db.add_foreign_key("hosts", &fk).await.unwrap();

        assert!(db.foreign_key_exists("hosts", &fk).await.unwrap());
        assert!(db.index_exists("UQ_host_name").await.unwrap());
        assert_eq!(db.count("SELECT COUNT(*) FROM hosts", &[]).await.unwrap(), 1);
        assert!(!db.table_exists("hosts__rebuild").await.unwrap());
    }

    #[tokio::test]
    async fn test_execute_atomic_rolls_back() {
        let db = SqliteAccessor::in_memory().await.unwrap();
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", &[]).await.unwrap();

        let result = db
            .execute_atomic(&[
                ("INSERT INTO t (id) VALUES (1)".to_string(), vec![]),
                ("INSERT INTO missing (id) VALUES (1)".to_string(), vec![]),
            ])
            .await;

        assert!(result.is_err());
        assert_eq!(db.count("SELECT COUNT(*) FROM t", &[]).await.unwrap(), 0);

        // The savepoint was released, so no transaction is left open.
        db.begin().await.expect("Should start a fresh transaction");
        db.execute("INSERT INTO t (id) VALUES (2)", &[]).await.unwrap();
        db.commit().await.unwrap();
        assert_eq!(db.count("SELECT COUNT(*) FROM t", &[]).await.unwrap(), 1);
    }
}
