#![doc = include_str!("../README.md")]

mod demo;

use clap::Parser;
use demo::config::{CliArgs, DemoConfig};
use demo::telemetry::init_telemetry;
use demo::workload::run_workload;
use loadwise::Dispatcher;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = DemoConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    let dispatcher = Dispatcher::spawn(config.dispatcher.clone())?;

    let summary = tokio::select! {
        summary = run_workload(&dispatcher, &config) => Some(summary),
        () = shutdown_signal() => None,
    };

    tracing::info!("Shutting down dispatcher");
    dispatcher.shutdown().await?;

    match summary.transpose()? {
        Some(summary) => summary.log(),
        None => tracing::info!("Workload interrupted before completion"),
    }
    Ok(())
}

fn log_startup_info(config: &DemoConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting demo with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting demo: {} jobs across {} workers",
            config.num_jobs,
            config.dispatcher.pool_size
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
}
