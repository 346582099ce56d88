//! CSV and JSON backup commands

use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use tracing::info;
use trade_journal::csv_io::{export_csv, import_csv};

use super::{finish, open_journal};

fn default_name(prefix: &str, ext: &str) -> String {
    format!("{}-{}.{}", prefix, Local::now().format("%Y-%m-%d"), ext)
}

pub async fn import_csv_file(config_path: String, file: String) -> Result<()> {
    let text = fs::read_to_string(&file).with_context(|| format!("Failed to read {}", file))?;
    // Parse before opening the store so a bad file changes nothing
    let records = import_csv(&text)?;

    let (_, mut store) = open_journal(&config_path).await?;
    let merged = store.import(records);
    let total = store.len();
    finish(store).await;

    println!("Imported {} trades from {} ({} total)", merged, file, total);
    Ok(())
}

pub async fn export_csv_file(config_path: String, output: Option<String>) -> Result<()> {
    let (_, store) = open_journal(&config_path).await?;
    let csv = export_csv(store.trades());
    let count = store.len();
    store.close().await;

    let output = output.unwrap_or_else(|| default_name("trades", "csv"));
    fs::write(&output, csv?).with_context(|| format!("Failed to write {}", output))?;
    info!("Exported {} trades to {}", count, output);
    println!("Exported {} trades to {}", count, output);
    Ok(())
}

pub async fn backup(config_path: String, output: Option<String>) -> Result<()> {
    let (_, store) = open_journal(&config_path).await?;
    let json = store.export_json();
    let count = store.len();
    store.close().await;

    let output = output.unwrap_or_else(|| default_name("trade-journal-backup", "json"));
    fs::write(&output, json?).with_context(|| format!("Failed to write {}", output))?;
    println!("Backed up {} trades to {}", count, output);
    Ok(())
}

pub async fn restore(config_path: String, file: String) -> Result<()> {
    let json = fs::read_to_string(&file).with_context(|| format!("Failed to read {}", file))?;
    let (_, mut store) = open_journal(&config_path).await?;
    let restored = store.import_snapshot(&json);
    finish(store).await;

    println!("Restored {} trades from {}", restored?, file);
    Ok(())
}
