//! ratelink-ids - applicant identifier resolution service
//!
//! Startup: tracing, configuration, database (fatal on failure), fetcher
//! state recovery, background fetch loop, HTTP server. Ctrl-C stops the
//! fetch loop and drains the server.

use anyhow::{Context, Result};
use clap::Parser;
use ratelink_ids::config::{Args, ServiceConfig};
use ratelink_ids::registry::RegistryClient;
use ratelink_ids::services::build_services;
use ratelink_ids::utils::TokioSleeper;
use ratelink_ids::{build_router, db, AppState};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Slack on top of the per-attempt timeout for the HTTP client's own limit
const CLIENT_TIMEOUT_SLACK: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting ratelink-ids v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = ServiceConfig::load(&args).context("Failed to load configuration")?;
    info!(
        programs = config.programs.len(),
        registry = %config.registry_base_url,
        "Configuration loaded"
    );

    info!("Database path: {}", config.database_path.display());
    let pool = match db::init_database_pool(&config.database_path).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to open database: {:#}", e);
            return Err(e);
        }
    };

    let client = RegistryClient::new(
        config.registry_base_url.clone(),
        config.fetch.request_timeout + CLIENT_TIMEOUT_SLACK,
    )?;

    let service = build_services(&config, pool.clone(), Arc::new(client), Arc::new(TokioSleeper)).await?;

    let shutdown = CancellationToken::new();
    let fetch_task = Arc::clone(service.fetcher()).start(shutdown.clone());

    let app = build_router(AppState::new(service, config.max_batch_items));
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("ratelink-ids listening on http://{}", config.bind_addr);

    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown requested");
            signal_token.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = fetch_task.await {
        error!("Fetch task ended abnormally: {}", e);
    }
    pool.close().await;

    info!("ratelink-ids stopped");
    Ok(())
}
