use std::sync::Arc;

use anyhow::Context;
use rex_core::barcode::codec::BarcodeCodec;
use rex_core::barcode::lifecycle::BarcodeLifecycle;
use rex_core::ports::SystemClock;
use rex_db::PgWarrantyStore;
use rex_events::{BusNotificationSink, EventBus};
use rex_worker::config::WorkerConfig;
use rex_worker::expiry::ExpirySweeper;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rex_worker=debug,rex_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env()?;
    tracing::info!(
        interval_secs = config.sweep_interval.as_secs(),
        batch_size = config.sweep_batch_size,
        "Loaded worker configuration"
    );

    // --- Database ---
    let pool = rex_db::create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    rex_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    rex_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    // --- Services ---
    let store = Arc::new(PgWarrantyStore::new(pool));
    let clock = Arc::new(SystemClock);
    let bus = Arc::new(EventBus::default());
    let lifecycle = Arc::new(BarcodeLifecycle::new(
        BarcodeCodec::new(&config.warranty.generator),
        store.clone(),
        clock.clone(),
        Arc::new(BusNotificationSink::new(bus)),
    ));
    let sweeper = ExpirySweeper::new(store, lifecycle, clock, config.sweep_batch_size);

    // --- Run until signalled ---
    let cancel = CancellationToken::new();
    let sweep = tokio::spawn(sweeper.run(config.sweep_interval, cancel.clone()));

    shutdown_signal().await?;
    cancel.cancel();
    sweep.await.context("Expiry sweep task panicked")?;

    tracing::info!("Worker stopped");
    Ok(())
}

/// Wait for SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to install Ctrl-C handler")?;
                tracing::info!("Received SIGINT (Ctrl-C), shutting down");
            }
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to install Ctrl-C handler")?;
        tracing::info!("Received Ctrl-C, shutting down");
    }

    Ok(())
}
