use std::sync::Arc;

use clap::Parser;
use modemwatch::{
    api::{ApiConfig, ApiState, spawn_api_server},
    config::{Config, read_config_file},
    device::adb::AdbClient,
    monitoring::MonitoringService,
};
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (defaults are used when omitted)
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new()
        .with_targets(vec![
            ("modemwatch", LevelFilter::DEBUG),
            ("tower_http", LevelFilter::DEBUG),
        ])
        .with_default(LevelFilter::INFO);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(path) => read_config_file(path)?,
        None => Config::default(),
    };

    let adb = Arc::new(AdbClient::new(config.adb.program.clone()));
    let service = Arc::new(MonitoringService::new(
        &config.monitoring,
        adb.clone(),
        adb,
    )?);
    service.bootstrap().await;

    let api_config = ApiConfig::from(config.api.clone());
    let addr = spawn_api_server(api_config, ApiState::new(service.clone())).await?;
    info!("modemwatch ready on http://{addr}");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
    }

    info!("shutting down");
    service.shutdown().await;

    Ok(())
}
