//! Exchange node binary
//!
//! Usage: `exchange-node [config.toml]`. Without a path, configuration is
//! read from the environment (`LEDGER_DATA_DIR`, `REFERRAL_BONUS_PERCENTAGE`,
//! `EXCHANGE_CATALOG_PATH`).

use anyhow::Context;
use settlement::{ChannelNotifier, Config, Exchange};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting exchange node");

    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        None => Config::from_env().context("loading configuration from environment")?,
    };

    // Notifications are handed to a delivery task; a full channel drops them
    let (notifier, mut notifications) = ChannelNotifier::new(config.notifications.channel_capacity);
    let delivery = tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            tracing::info!(
                recipient = %notification.recipient(),
                notification = ?notification,
                "Delivering notification"
            );
        }
    });

    let exchange = Exchange::open(config, Arc::new(notifier))
        .await
        .context("opening exchange")?;

    let pending = exchange.list_pending_transactions()?.len();
    tracing::info!(pending, "Exchange node running");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down exchange node");
    exchange.shutdown().await?;
    drop(exchange);
    let _ = delivery.await;

    Ok(())
}
