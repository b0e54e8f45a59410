//! Market Data Service - index LTP sampler
//!
//! Polls the selected index price, writes every tick to TimescaleDB and
//! keeps live candles for every configured timeframe until Ctrl+C or
//! SIGTERM.

use anyhow::{Context, Result};
use market_data_service::{MarketDataConfig, MarketDataService, TimescaleStore};
use services_common::{DatabaseConfig, DhanConfig, DhanQuoteClient};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "market-data-service";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting {} v{}", SERVICE_NAME, env!("CARGO_PKG_VERSION"));

    let config = MarketDataConfig::from_env().context("Invalid sampling configuration")?;
    let database = DatabaseConfig::from_env().context("Invalid database configuration")?;
    let dhan = DhanConfig::from_env().context("Invalid Dhan configuration")?;

    let client = Arc::new(DhanQuoteClient::new(dhan));
    let store = Arc::new(TimescaleStore::new(database));
    let service = MarketDataService::new(config, client, store);

    service.start().await?;

    shutdown_signal().await;

    if let Err(e) = service.stop().await {
        error!("Shutdown incomplete: {}", e);
    }
    info!("Final metrics: {:?}", service.metrics());

    // The blocking HTTP client must be released off the async executor
    tokio::task::spawn_blocking(move || drop(service))
        .await
        .context("Failed to release quote client")?;

    Ok(())
}

/// Initialize tracing with an env filter and fmt layer
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "{}=info,services_common=info,sqlx=warn",
                    SERVICE_NAME.replace('-', "_")
                )
                .into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_thread_names(true),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        () = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
