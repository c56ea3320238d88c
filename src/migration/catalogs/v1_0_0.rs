//! Baseline catalog: creates the core tables on a fresh database and brings
//! databases created before version tracking up to the same shape.

use crate::cluster::{CLUSTERS_TABLE, CLUSTER_CONFIG_TABLE};
use crate::migration::context::{DataContext, SchemaContext};
use crate::migration::stamp::metainfo_table;
use crate::migration::types::{MigrationError, UpgradeCatalog};
use crate::schema::{ColumnInfo, ColumnType, FailurePolicy, ForeignKey, TableDefinition};
use crate::utils::SEQUENCE_TABLE;
use async_trait::async_trait;
use once_cell::sync::Lazy;

const TARGET_VERSION: &str = "1.0.0";

pub const HOSTS_TABLE: &str = "hosts";
pub const USERS_TABLE: &str = "users";

static TABLES: Lazy<Vec<TableDefinition>> = Lazy::new(|| {
    vec![
        metainfo_table(),
        TableDefinition::new(SEQUENCE_TABLE)
            .column(ColumnInfo::new("sequence_name", ColumnType::Varchar(255)).not_null())
            .column(ColumnInfo::new("sequence_value", ColumnType::BigInt).not_null())
            .primary_key(&["sequence_name"]),
        TableDefinition::new(CLUSTERS_TABLE)
            .column(ColumnInfo::new("cluster_id", ColumnType::BigInt).not_null())
            .column(ColumnInfo::new("cluster_name", ColumnType::Varchar(100)).not_null())
            .primary_key(&["cluster_id"]),
        TableDefinition::new(CLUSTER_CONFIG_TABLE)
            .column(ColumnInfo::new("config_id", ColumnType::Integer))
            .column(ColumnInfo::new("cluster_id", ColumnType::BigInt).not_null())
            .column(ColumnInfo::new("type_name", ColumnType::Varchar(100)).not_null())
            .column(ColumnInfo::new("version_tag", ColumnType::Varchar(100)).not_null())
            .column(ColumnInfo::new("version", ColumnType::BigInt).not_null())
            .column(ColumnInfo::new("config_data", ColumnType::Text).not_null())
            .column(ColumnInfo::new("create_timestamp", ColumnType::BigInt).not_null())
            .column(
                ColumnInfo::new("selected", ColumnType::Boolean)
                    .default_value(0)
                    .not_null(),
            )
            .primary_key(&["config_id"]),
        TableDefinition::new(HOSTS_TABLE)
            .column(ColumnInfo::new("host_id", ColumnType::BigInt).not_null())
            .column(ColumnInfo::new("host_name", ColumnType::Varchar(255)).not_null())
            .column(ColumnInfo::new("cluster_id", ColumnType::BigInt))
            .primary_key(&["host_id"]),
        TableDefinition::new(USERS_TABLE)
            .column(ColumnInfo::new("user_id", ColumnType::Integer).not_null())
            .column(ColumnInfo::new("user_name", ColumnType::Varchar(255)).not_null())
            .column(ColumnInfo::new("create_time", ColumnType::Timestamp))
            .primary_key(&["user_id"]),
    ]
});

/// Baseline schema for version 1.0.0.
pub struct BaselineCatalog;

impl BaselineCatalog {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BaselineCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpgradeCatalog for BaselineCatalog {
    fn source_version(&self) -> Option<&str> {
        None
    }

    fn target_version(&self) -> &str {
        TARGET_VERSION
    }

    fn description(&self) -> &str {
        "Create baseline cluster, host, user and configuration tables"
    }

    async fn run_schema_changes(&self, ctx: &SchemaContext) -> Result<(), MigrationError> {
        let primitives = ctx.primitives();

        for table in TABLES.iter() {
            primitives
                .add_table_if_absent(table, FailurePolicy::Propagate)
                .await?;
        }

        primitives
            .add_unique_constraint_if_absent(
                CLUSTER_CONFIG_TABLE,
                "UQ_clusterconfig_tag",
                &[
                    "cluster_id".to_string(),
                    "type_name".to_string(),
                    "version_tag".to_string(),
                ],
                FailurePolicy::Propagate,
            )
            .await?;

        primitives
            .add_foreign_key_if_absent(
                CLUSTER_CONFIG_TABLE,
                &ForeignKey::new(
                    "FK_clusterconfig_cluster_id",
                    &["cluster_id"],
                    CLUSTERS_TABLE,
                    &["cluster_id"],
                ),
                FailurePolicy::Propagate,
            )
            .await?;
        primitives
            .add_foreign_key_if_absent(
                HOSTS_TABLE,
                &ForeignKey::new(
                    "FK_hosts_cluster_id",
                    &["cluster_id"],
                    CLUSTERS_TABLE,
                    &["cluster_id"],
                ),
                FailurePolicy::Propagate,
            )
            .await?;

        primitives
            .add_sequences_if_absent(
                &["cluster_id_seq", "host_id_seq", "user_id_seq"],
                1,
                FailurePolicy::Propagate,
            )
            .await?;

        Ok(())
    }

    async fn run_data_changes(&self, ctx: &DataContext) -> Result<(), MigrationError> {
        ctx.execute_raw(
            &format!(
                "INSERT INTO {table} (user_id, user_name, create_time) \
                 SELECT (SELECT COALESCE(MAX(user_id), 0) + 1 FROM {table}), ?, CURRENT_TIMESTAMP \
                 WHERE NOT EXISTS (SELECT 1 FROM {table} WHERE user_name = ?)",
                table = USERS_TABLE
            ),
            &["admin".into(), "admin".into()],
        )
        .await?;

        ctx.sync_sequence("user_id_seq", USERS_TABLE, "user_id").await?;
        Ok(())
    }
}
