use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use fleetd_core::configuration::DaemonConfig;
use fleetd_core::container::health::run_health_sweep;
use fleetd_core::root::Root;
use fleetd_store::{prepare_database_schema, PgConnectionString};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod ipc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry().with(fmt::layer()).with(EnvFilter::from_default_env()).init();

    let config = DaemonConfig::parse();

    let pool = prepare_database_schema(PgConnectionString(config.database_url.clone())).await.context("preparing database schema")?;

    let root = Arc::new(Root::build(&config, pool));

    tracing::info!("recovering containers from previous run");
    root.container_manager.recover().await.context("recovering containers")?;

    tokio::spawn(run_health_sweep(root.bmc.clone(), root.container_manager.clone()));

    ipc::serve(&config.socket_path, root).await
}
