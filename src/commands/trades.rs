//! Journal commands: list, add, delete, attach, stats, clear

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use std::path::Path;
use tracing::{info, warn};
use trade_journal::codec::sniff_mime;
use trade_journal::stats::{equity_curve, Timeframe, TradeFilter, TradeStats};
use trade_journal::{parse_time, Direction, ExitType, MarketType, TradeImage, TradeRecord};

use super::{finish, open_journal};

/// Filter flags shared by `list` and `stats`
pub struct FilterArgs {
    pub strategy: Option<String>,
    pub market: Option<String>,
    pub timeframe: Option<String>,
}

impl FilterArgs {
    fn into_filter(self) -> Result<TradeFilter> {
        Ok(TradeFilter {
            strategy: self.strategy,
            market_type: self.market.map(|m| m.parse::<MarketType>()).transpose()?,
            timeframe: self.timeframe.map(|t| t.parse::<Timeframe>()).transpose()?,
        })
    }
}

/// Fields for a new trade
pub struct NewTrade {
    pub pair: String,
    pub direction: String,
    pub entry: f64,
    pub size: f64,
    pub date: Option<String>,
    pub time: Option<String>,
    pub exit: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub exit_type: Option<String>,
    pub strategy: Option<String>,
    pub market: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<String>,
}

impl NewTrade {
    fn into_record(self) -> Result<TradeRecord> {
        let direction: Direction = self.direction.parse()?;
        let date = match self.date {
            Some(d) => NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", d))?,
            None => Local::now().date_naive(),
        };

        let mut record = TradeRecord::new(self.pair, direction, self.entry, self.size, date)
            .with_stops(self.stop_loss, self.take_profit)
            .with_strategy(self.strategy.unwrap_or_default())
            .with_notes(self.notes.unwrap_or_default());

        if let Some(t) = self.time {
            let time = parse_time(&t).with_context(|| format!("Invalid time '{}', expected HH:MM", t))?;
            record = record.with_time(time);
        }
        if let Some(m) = self.market {
            record = record.with_market_type(m.parse()?);
        }
        if let Some(tags) = self.tags {
            record = record.with_tags(tags.split(',').map(str::trim).filter(|t| !t.is_empty()));
        }

        let exit_type = self.exit_type.map(|e| e.parse::<ExitType>()).transpose()?;
        match (self.exit, exit_type) {
            (Some(exit), exit_type) => record = record.closed_at(exit, exit_type),
            (None, Some(exit_type)) => record.apply_exit_type(exit_type),
            (None, None) => {}
        }
        Ok(record)
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

pub async fn list(config_path: String, filter: FilterArgs) -> Result<()> {
    let filter = filter.into_filter()?;
    let (_, store) = open_journal(&config_path).await?;
    let today = Local::now().date_naive();
    let trades = filter.apply(store.trades(), today);

    println!(
        "{:<38} {:<10} {:<10} {:<6} {:>12} {:>12} {:>10} {:>12} {:<7} {:<18}",
        "ID", "DATE", "PAIR", "SIDE", "ENTRY", "EXIT", "SIZE", "PNL", "STATUS", "STRATEGY"
    );
    for t in &trades {
        println!(
            "{:<38} {:<10} {:<10} {:<6} {:>12} {:>12} {:>10} {:>12.2} {:<7} {:<18}",
            t.id,
            t.date,
            t.pair,
            t.direction,
            t.entry_price,
            fmt_opt(t.exit_price),
            t.size,
            t.pnl,
            t.status,
            t.strategy
        );
    }
    println!("\n{} of {} trades", trades.len(), store.len());

    store.close().await;
    Ok(())
}

pub async fn add(config_path: String, trade: NewTrade) -> Result<()> {
    let record = trade.into_record()?;
    let (_, mut store) = open_journal(&config_path).await?;

    let id = record.id.clone();
    let pnl = record.pnl;
    store.add(record).context("Trade rejected")?;
    finish(store).await;

    info!("Added trade {}", id);
    println!("Added trade {} (pnl {:.2})", id, pnl);
    Ok(())
}

pub async fn delete(config_path: String, id: String) -> Result<()> {
    let (_, mut store) = open_journal(&config_path).await?;
    let deleted = store.delete(&id);
    finish(store).await;

    if !deleted {
        bail!("No trade with id {}", id);
    }
    println!("Deleted trade {}", id);
    Ok(())
}

pub async fn attach(config_path: String, trade_id: String, file: String, mime: Option<String>) -> Result<()> {
    let (config, mut store) = open_journal(&config_path).await?;

    let path = Path::new(&file);
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", file))?;

    let mime = match mime.or_else(|| sniff_mime(&bytes).map(str::to_string)) {
        Some(m) => m,
        None => {
            store.close().await;
            bail!("Could not detect an image type for {}", file);
        }
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.clone());

    let image = match TradeImage::from_bytes_with_limit(name, &mime, &bytes, config.images.max_image_bytes) {
        Ok(image) => image,
        Err(e) => {
            store.close().await;
            return Err(e.into());
        }
    };
    let image_id = image.id.clone();
    let attached = store.attach_image(&trade_id, image);
    finish(store).await;

    if !attached? {
        bail!("No trade with id {}", trade_id);
    }
    println!("Attached image {} to trade {}", image_id, trade_id);
    Ok(())
}

pub async fn stats(config_path: String, filter: FilterArgs, curve: bool) -> Result<()> {
    let filter = filter.into_filter()?;
    let (_, store) = open_journal(&config_path).await?;
    let today = Local::now().date_naive();
    let selected: Vec<TradeRecord> = filter.apply(store.trades(), today).into_iter().cloned().collect();
    let stats = TradeStats::from_trades(&selected);

    println!("\n{}", "=".repeat(40));
    println!("JOURNAL STATISTICS");
    println!("{}", "=".repeat(40));
    println!("Closed Trades:   {}", stats.total_trades);
    println!("Winners/Losers:  {}/{}", stats.winning_trades, stats.losing_trades);
    println!("Win Rate:        {:.2}%", stats.win_rate);
    println!("Total PnL:       {:.2}", stats.total_pnl);
    println!("Average PnL:     {:.2}", stats.avg_pnl);
    println!("Best Trade:      {:.2}", stats.best_trade);
    println!("Worst Trade:     {:.2}", stats.worst_trade);
    println!("Profit Factor:   {:.2}", stats.profit_factor);

    if curve {
        println!("\nEquity curve:");
        for point in equity_curve(&selected) {
            println!("  {}  {:>12.2}", point.date, point.pnl);
        }
    }

    store.close().await;
    Ok(())
}

pub async fn clear(config_path: String, yes: bool) -> Result<()> {
    if !yes {
        bail!("Refusing to clear the journal without --yes");
    }
    let (_, mut store) = open_journal(&config_path).await?;
    let count = store.len();
    store.clear();
    finish(store).await;

    warn!("Cleared {} trades", count);
    println!("Cleared {} trades", count);
    Ok(())
}
