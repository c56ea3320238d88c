//! Managed clusters and their versioned configuration.
//!
//! The store here is the mapped persistence layer: it is only started after
//! every catalog's schema phase has run, and it caches selected revisions.
//! The reconciler is the only code that creates configuration revisions.

mod reconcile;
mod store;
mod types;

pub use reconcile::{
    ClusterReconcileResult, ConfigReconciler, ConfigUpdate, ReconcileError, ReconcileOutcome,
    ReconcileSummary, SkipReason,
};
pub use store::{ClusterConfigStore, SqlClusterStore, CLUSTERS_TABLE, CLUSTER_CONFIG_TABLE};
pub use types::{Cluster, ClusterConfigurationRevision, StoreError};
