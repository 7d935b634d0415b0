//! # Background Sync Provider Binary
//!
//! Runs the critical alert sync schedule, the legacy data migration and the
//! event reporter until interrupted. Configuration comes from environment
//! variables (`SERVER_URL`, `REDIS_URL`, `DEVICE_ID`, ...).

use anyhow::{Context, Result};
use tracing::info;

use background_sync_provider::BackgroundSyncProvider;
use guardian_common::GuardianConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with environment filter
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("background_sync_provider=info".parse()?)
                .add_directive("data_migration=info".parse()?),
        )
        .init();

    info!("🌟 Starting Background Sync Provider");

    let config = GuardianConfig::from_env().context("Failed to load configuration")?;
    info!("Server URL: {}", config.server_url);
    info!(
        "Sync interval: {} minutes",
        config.effective_sync_interval_minutes()
    );

    let provider = BackgroundSyncProvider::new(config)
        .await
        .context("Failed to create Background Sync provider")?;

    let report = provider
        .start()
        .await
        .context("Failed to start Background Sync provider")?;
    if let Some(migration) = &report.migration {
        info!(
            "Legacy migration: success={} messages={}",
            migration.success, migration.messages_migrated
        );
    }

    info!("🎯 Provider ready - waiting for shutdown signal");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    provider.shutdown().await;
    info!("👋 Background Sync Provider shutdown complete");
    Ok(())
}
