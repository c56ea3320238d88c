//! 1.2.0: rack column rename and cluster-env cleanup.

use super::declarative::{DataStep, DeclarativeCatalog};
use super::v1_0_0::HOSTS_TABLE;
use crate::cluster::ConfigUpdate;
use crate::schema::AlterOp;

pub fn catalog() -> DeclarativeCatalog {
    DeclarativeCatalog::new(
        Some("1.1.0"),
        "1.2.0",
        "Rename host rack column and drop deprecated cluster-env keys",
    )
    .schema(AlterOp::rename_column(HOSTS_TABLE, "rack_info", "rack"))
    .schema(AlterOp::create_index(HOSTS_TABLE, "IDX_hosts_rack", &["rack"]))
    .data(DataStep::Reconcile(
        ConfigUpdate::new("cluster-env")
            .rename("security_enabled", "kerberos_enabled")
            .remove("ignore_groupsusers_create")
            .remove("smokeuser_principal_name"),
    ))
}
