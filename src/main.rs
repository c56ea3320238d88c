use anyhow::Context;
use clap::Parser;
use clusterdb_upgrade::cluster::SqlClusterStore;
use clusterdb_upgrade::config::{read_config, UpgradeConfig};
use clusterdb_upgrade::migration::{
    catalog_label, create_registry, ExecutorOptions, UpgradeExecutor, UpgradeLock,
};
use clusterdb_upgrade::schema::{SchemaAccessor, SchemaPrimitives, SqliteAccessor};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// ClusterDB upgrade tool - brings a cluster management database to a target version
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Version to upgrade to. Defaults to the newest registered catalog.
    target: Option<String>,

    /// Database to upgrade, e.g. sqlite://clusterdb.sqlite
    #[arg(long, env = "CLUSTERDB_DATABASE_URL")]
    database_url: Option<String>,

    /// JSON configuration file
    #[arg(short, long, env = "CLUSTERDB_UPGRADE_CONFIG")]
    config: Option<PathBuf>,

    /// Number of version segments to compare (0 compares all)
    #[arg(long)]
    precision: Option<usize>,

    /// Remove a lock left behind by a crashed run before starting
    #[arg(long)]
    break_lock: bool,

    /// Print the stamped version and pending catalogs, then exit
    #[arg(long)]
    status: bool,
}

async fn load_config(args: &Args) -> anyhow::Result<UpgradeConfig> {
    let mut config = match &args.config {
        Some(path) => read_config(path)
            .await
            .with_context(|| format!("Failed to read config {}", path.display()))?
            .with_context(|| format!("Config file {} not found", path.display()))?,
        None => UpgradeConfig::default(),
    };

    if let Some(url) = &args.database_url {
        config.database_url = url.clone();
    }
    if let Some(precision) = args.precision {
        config.version_precision = precision;
    }
    Ok(config)
}

fn init_logging(default_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .context("Invalid log filter")?;
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn run(args: Args, config: UpgradeConfig) -> anyhow::Result<()> {
    let registry = create_registry(config.version_precision)?;
    let target = match args.target {
        Some(target) => target,
        None => registry
            .latest_version()
            .map(str::to_string)
            .context("No upgrade catalogs are registered")?,
    };

    let accessor: Arc<dyn SchemaAccessor> = Arc::new(
        SqliteAccessor::connect(&config.database_url)
            .await
            .with_context(|| format!("Failed to open database {}", config.database_url))?,
    );

    if args.break_lock && UpgradeLock::break_lock(&SchemaPrimitives::new(accessor.clone())).await? {
        warn!("Removed an existing upgrade lock");
    }

    let store = Arc::new(SqlClusterStore::new(accessor.clone()));
    let executor = UpgradeExecutor::new(registry, accessor, store).with_options(ExecutorOptions {
        lock_enabled: config.lock_enabled,
        strict_reconciliation: config.strict_reconciliation,
    });

    if args.status {
        let plan = executor.plan(&target).await?;
        println!("Stamped version: {}", plan.stamped.as_deref().unwrap_or("none"));
        println!("Target version:  {}", plan.target);
        if plan.catalogs.is_empty() {
            println!("Up to date");
        }
        for catalog in &plan.catalogs {
            println!(
                "  pending {}: {}",
                catalog_label(catalog.as_ref()),
                catalog.description()
            );
        }
        return Ok(());
    }

    info!(database = %config.database_url, target = %target, "Starting upgrade tool");
    let report = executor.upgrade(&target).await?;

    for applied in &report.applied {
        info!(
            version = %applied.target_version,
            description = %applied.description,
            "Applied catalog"
        );
    }
    info!(
        stamped = report.stamped_version.as_deref().unwrap_or("none"),
        "Database is at target version"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args).await?;
    init_logging(&config.log_level)?;

    if let Err(e) = run(args, config).await {
        error!(error = %format!("{:#}", e), "Upgrade failed");
        return Err(e);
    }
    Ok(())
}
