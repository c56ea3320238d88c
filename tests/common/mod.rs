#![allow(dead_code)]

use async_trait::async_trait;
use clusterdb_upgrade::cluster::SqlClusterStore;
use clusterdb_upgrade::migration::{
    CatalogRegistry, DataContext, MigrationError, SchemaContext, UpgradeCatalog, UpgradeExecutor,
};
use clusterdb_upgrade::schema::{ForeignKey, SchemaAccessor, SqlValue, SqliteAccessor};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// A file-backed SQLite database that lives as long as the returned value.
pub struct TestDb {
    _dir: TempDir,
    pub url: String,
    pub accessor: Arc<dyn SchemaAccessor>,
}

pub async fn create_test_db() -> TestDb {
    let dir = tempfile::tempdir().expect("Should create temp dir");
    let url = format!("sqlite://{}", dir.path().join("clusterdb.sqlite").display());
    let accessor = SqliteAccessor::connect(&url)
        .await
        .expect("Should open test database");

    TestDb {
        _dir: dir,
        url,
        accessor: Arc::new(accessor),
    }
}

pub fn create_executor(db: &TestDb, registry: Arc<CatalogRegistry>) -> UpgradeExecutor {
    let store = Arc::new(SqlClusterStore::new(db.accessor.clone()));
    UpgradeExecutor::new(registry, db.accessor.clone(), store)
}

/// Accessor wrapper that counts statements writing to the `metainfo` table.
pub struct CountingAccessor {
    inner: Arc<dyn SchemaAccessor>,
    metainfo_writes: AtomicUsize,
}

impl CountingAccessor {
    pub fn new(inner: Arc<dyn SchemaAccessor>) -> Self {
        Self {
            inner,
            metainfo_writes: AtomicUsize::new(0),
        }
    }

    pub fn metainfo_writes(&self) -> usize {
        self.metainfo_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchemaAccessor for CountingAccessor {
    async fn execute(&self, sql: &str, args: &[SqlValue]) -> Result<u64, sqlx::Error> {
        let lowered = sql.to_ascii_lowercase();
        if lowered.contains("metainfo") && !lowered.trim_start().starts_with("select") {
            self.metainfo_writes.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.execute(sql, args).await
    }

    async fn fetch_all(
        &self,
        sql: &str,
        args: &[SqlValue],
    ) -> Result<Vec<Vec<SqlValue>>, sqlx::Error> {
        self.inner.fetch_all(sql, args).await
    }

    async fn table_exists(&self, table: &str) -> Result<bool, sqlx::Error> {
        self.inner.table_exists(table).await
    }

    async fn column_exists(&self, table: &str, column: &str) -> Result<bool, sqlx::Error> {
        self.inner.column_exists(table, column).await
    }

    async fn index_exists(&self, name: &str) -> Result<bool, sqlx::Error> {
        self.inner.index_exists(name).await
    }

    async fn foreign_key_exists(
        &self,
        table: &str,
        foreign_key: &ForeignKey,
    ) -> Result<bool, sqlx::Error> {
        self.inner.foreign_key_exists(table, foreign_key).await
    }

    async fn add_foreign_key(
        &self,
        table: &str,
        foreign_key: &ForeignKey,
    ) -> Result<(), sqlx::Error> {
        self.inner.add_foreign_key(table, foreign_key).await
    }
}

/// Create the tables the cluster store needs, for tests that use mock
/// catalogs instead of the built-in baseline.
pub async fn create_cluster_tables(accessor: &dyn SchemaAccessor) {
    accessor
        .execute(
            "CREATE TABLE clusters (cluster_id BIGINT PRIMARY KEY, cluster_name VARCHAR(100) NOT NULL)",
            &[],
        )
        .await
        .expect("Should create clusters");
    accessor
        .execute(
            "CREATE TABLE clusterconfig (config_id INTEGER PRIMARY KEY, cluster_id BIGINT NOT NULL, \
             type_name VARCHAR(100) NOT NULL, version_tag VARCHAR(100) NOT NULL, version BIGINT NOT NULL, \
             config_data TEXT NOT NULL, create_timestamp BIGINT NOT NULL, selected SMALLINT DEFAULT 0 NOT NULL)",
            &[],
        )
        .await
        .expect("Should create clusterconfig");
}

/// Insert a cluster with one selected revision of `config_type` whose
/// stored data is `config_data` verbatim.
pub async fn seed_cluster(
    accessor: &dyn SchemaAccessor,
    cluster_id: i64,
    name: &str,
    config_type: &str,
    config_data: &str,
) {
    accessor
        .execute(
            "INSERT INTO clusters (cluster_id, cluster_name) VALUES (?, ?)",
            &[SqlValue::Integer(cluster_id), name.into()],
        )
        .await
        .expect("Should insert cluster");
    accessor
        .execute(
            "INSERT INTO clusterconfig (cluster_id, type_name, version_tag, version, config_data, \
             create_timestamp, selected) VALUES (?, ?, 'version1', 1, ?, 1000, 1)",
            &[
                SqlValue::Integer(cluster_id),
                config_type.into(),
                config_data.into(),
            ],
        )
        .await
        .expect("Should insert configuration");
}

/// Which phase a [`RecordingCatalog`] should fail in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailIn {
    Schema,
    Data,
}

/// Mock catalog that appends `"<phase> <target>"` to a shared journal.
pub struct RecordingCatalog {
    target: String,
    is_final: bool,
    journal: Arc<Mutex<Vec<String>>>,
    fail_in: Option<FailIn>,
    failing: AtomicBool,
}

impl RecordingCatalog {
    pub fn new(target: &str, journal: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            target: target.to_string(),
            is_final: false,
            journal: journal.clone(),
            fail_in: None,
            failing: AtomicBool::new(false),
        }
    }

    pub fn final_catalog(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn failing_in(mut self, phase: FailIn) -> Self {
        self.fail_in = Some(phase);
        self.failing = AtomicBool::new(true);
        self
    }

    /// Stop failing, as if the cause had been fixed before a rerun.
    pub fn heal(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }

    fn record(&self, phase: &str) {
        self.journal
            .lock()
            .expect("Journal lock")
            .push(format!("{} {}", phase, self.target));
    }

    fn should_fail(&self, phase: FailIn) -> bool {
        self.fail_in == Some(phase) && self.failing.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpgradeCatalog for RecordingCatalog {
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
        "Recording catalog"
    }

    async fn run_schema_changes(&self, ctx: &SchemaContext) -> Result<(), MigrationError> {
        self.record("schema");
        let table = format!("marker_{}", self.target.replace('.', "_"));
        ctx.primitives()
            .accessor()
            .execute(&format!("CREATE TABLE IF NOT EXISTS {} (id INTEGER)", table), &[])
            .await
            .map_err(|e| MigrationError::DataMigrationFailed(e.to_string()))?;

        if self.should_fail(FailIn::Schema) {
            return Err(MigrationError::DataMigrationFailed("schema boom".to_string()));
        }
        Ok(())
    }

    async fn run_pre_data_changes(&self, _ctx: &DataContext) -> Result<(), MigrationError> {
        self.record("pre-data");
        Ok(())
    }

    async fn run_data_changes(&self, _ctx: &DataContext) -> Result<(), MigrationError> {
        self.record("data");
        if self.should_fail(FailIn::Data) {
            return Err(MigrationError::DataMigrationFailed("data boom".to_string()));
        }
        Ok(())
    }
}

pub fn journal() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn take(journal: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    std::mem::take(&mut *journal.lock().expect("Journal lock"))
}
