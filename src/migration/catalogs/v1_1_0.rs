//! 1.1.0: user display names, host rack info and per-host version tracking.

use super::declarative::{DataStep, DeclarativeCatalog};
use super::v1_0_0::{HOSTS_TABLE, USERS_TABLE};
use crate::cluster::ConfigUpdate;
use crate::schema::{AlterOp, ColumnInfo, ColumnType, ForeignKey, SchemaStep, TableDefinition};

pub const HOST_VERSION_TABLE: &str = "host_version";

pub fn catalog() -> DeclarativeCatalog {
    DeclarativeCatalog::new(
        Some("1.0.0"),
        "1.1.0",
        "Add user display names, host rack info and host version tracking",
    )
    .schema(AlterOp::add_column(
        USERS_TABLE,
        ColumnInfo::new("display_name", ColumnType::Varchar(255)),
    ))
    .schema(AlterOp::add_column(
        USERS_TABLE,
        ColumnInfo::new("local_username", ColumnType::Varchar(255)),
    ))
    .schema(AlterOp::add_column(
        USERS_TABLE,
        ColumnInfo::new("consecutive_failures", ColumnType::Integer)
            .default_value(0)
            .not_null(),
    ))
    .schema(AlterOp::add_column(
        HOSTS_TABLE,
        ColumnInfo::new("rack_info", ColumnType::Varchar(255)),
    ))
    .schema(AlterOp::CreateTable(
        TableDefinition::new(HOST_VERSION_TABLE)
            .column(ColumnInfo::new("id", ColumnType::BigInt).not_null())
            .column(ColumnInfo::new("host_id", ColumnType::BigInt).not_null())
            .column(ColumnInfo::new("repo_version", ColumnType::Varchar(255)).not_null())
            .column(ColumnInfo::new("state", ColumnType::Varchar(32)).not_null())
            .primary_key(&["id"]),
    ))
    .schema(AlterOp::add_foreign_key(
        HOST_VERSION_TABLE,
        ForeignKey::new("FK_host_version_host_id", &["host_id"], HOSTS_TABLE, &["host_id"]),
    ))
    .schema(AlterOp::add_sequence("host_version_id_seq", 1))
    // Existing installs may already hold case-variant duplicates.
    .schema(
        SchemaStep::new(AlterOp::add_unique(
            USERS_TABLE,
            "UNQ_users_user_name",
            &["user_name"],
        ))
        .ignore_failure(),
    )
    .schema(AlterOp::create_index(
        HOST_VERSION_TABLE,
        "IDX_host_version_host_id",
        &["host_id"],
    ))
    .pre_data(DataStep::sql(format!(
        "UPDATE {} SET local_username = lower(user_name) WHERE local_username IS NULL",
        USERS_TABLE
    )))
    .data(DataStep::sql(format!(
        "UPDATE {} SET display_name = user_name WHERE display_name IS NULL",
        USERS_TABLE
    )))
    .data(DataStep::sync_sequence("host_id_seq", HOSTS_TABLE, "host_id"))
    .data(DataStep::Reconcile(
        ConfigUpdate::new("cluster-env")
            .set("recovery_enabled", "true")
            .set("recovery_type", "AUTO_START")
            .set("recovery_max_count", "6"),
    ))
}
