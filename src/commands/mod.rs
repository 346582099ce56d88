pub mod interchange;
pub mod tools;
pub mod trades;

use anyhow::{Context, Result};
use tracing::info;
use trade_journal::{seed, JournalConfig, TradeStore};

/// Load config and open the journal on the configured backend
pub async fn open_journal(config_path: &str) -> Result<(JournalConfig, TradeStore)> {
    let config = JournalConfig::load_or_default(config_path)?;
    info!(
        "Opening journal ({} backend, namespace '{}')",
        config.storage.backend, config.storage.namespace
    );

    let engine = config.engine().context("Failed to open storage")?;
    let store = TradeStore::open(engine, &seed::default_trades())
        .await?
        .with_max_images(config.images.max_images);
    Ok((config, store))
}

/// Wait for queued writes and stop the persistence task
pub async fn finish(store: TradeStore) {
    store.flush().await;
    store.close().await;
}
