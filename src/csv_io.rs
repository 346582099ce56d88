//! CSV import/export
//!
//! Fixed column order:
//! Date, Time, Pair, Type, Entry Price, Exit Price, Stop Loss, Take Profit,
//! Size, PnL, Status, Strategy, Market Type, Exit Type, Notes, Tags
//!
//! Import is schema-driven: Date, Pair, Entry Price and Size columns are
//! required, everything else falls back to a default. Rows lacking a pair,
//! a positive entry price, a positive size or a parseable date are dropped.

use chrono::{Local, NaiveDate, NaiveTime, Timelike, Utc};
use csv::{QuoteStyle, ReaderBuilder, Trim, WriterBuilder};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{JournalError, JournalResult};
use crate::types::{parse_time, Direction, ExitType, MarketType, TradeRecord, TradeStatus};

pub const HEADERS: [&str; 16] = [
    "Date",
    "Time",
    "Pair",
    "Type",
    "Entry Price",
    "Exit Price",
    "Stop Loss",
    "Take Profit",
    "Size",
    "PnL",
    "Status",
    "Strategy",
    "Market Type",
    "Exit Type",
    "Notes",
    "Tags",
];

const DEFAULT_STRATEGY: &str = "Imported";

fn opt_num(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Render trades as CSV with every cell quoted
pub fn export_csv(trades: &[TradeRecord]) -> JournalResult<String> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());

    let to_err = |e: csv::Error| JournalError::Export(e.to_string());

    writer.write_record(HEADERS).map_err(to_err)?;
    for trade in trades {
        writer
            .write_record([
                trade.date.format("%Y-%m-%d").to_string(),
                trade.time.map(|t| t.format("%H:%M").to_string()).unwrap_or_default(),
                trade.pair.clone(),
                trade.direction.to_string(),
                trade.entry_price.to_string(),
                opt_num(trade.exit_price),
                opt_num(trade.stop_loss),
                opt_num(trade.take_profit),
                trade.size.to_string(),
                trade.pnl.to_string(),
                trade.status.to_string(),
                trade.strategy.clone(),
                trade.market_type.to_string(),
                trade.exit_type.map(|e| e.to_string()).unwrap_or_default(),
                trade.notes.clone(),
                trade.tags.join(";"),
            ])
            .map_err(to_err)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| JournalError::Export(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| JournalError::Export(e.to_string()))
}

/// One CSV row. Required columns have no serde default, so a file missing
/// them fails before any row is produced.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Time", default)]
    time: Option<String>,
    #[serde(rename = "Pair")]
    pair: String,
    #[serde(rename = "Type", default)]
    direction: Option<String>,
    #[serde(rename = "Entry Price", deserialize_with = "csv::invalid_option")]
    entry_price: Option<f64>,
    #[serde(rename = "Exit Price", default, deserialize_with = "csv::invalid_option")]
    exit_price: Option<f64>,
    #[serde(rename = "Stop Loss", default, deserialize_with = "csv::invalid_option")]
    stop_loss: Option<f64>,
    #[serde(rename = "Take Profit", default, deserialize_with = "csv::invalid_option")]
    take_profit: Option<f64>,
    #[serde(rename = "Size", deserialize_with = "csv::invalid_option")]
    size: Option<f64>,
    #[serde(rename = "PnL", default, deserialize_with = "csv::invalid_option")]
    pnl: Option<f64>,
    #[serde(rename = "Status", default)]
    status: Option<String>,
    #[serde(rename = "Strategy", default)]
    strategy: Option<String>,
    #[serde(rename = "Market Type", default)]
    market_type: Option<String>,
    #[serde(rename = "Exit Type", default)]
    exit_type: Option<String>,
    #[serde(rename = "Notes", default)]
    notes: Option<String>,
    #[serde(rename = "Tags", default)]
    tags: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn current_minute() -> Option<NaiveTime> {
    let now = Local::now().time();
    NaiveTime::from_hms_opt(now.hour(), now.minute(), 0)
}

impl CsvRow {
    fn into_trade(self, id: String) -> Option<TradeRecord> {
        let pair = self.pair.trim().to_string();
        let entry_price = self.entry_price.filter(|p| *p > 0.0)?;
        let size = self.size.filter(|s| *s > 0.0)?;
        if pair.is_empty() {
            return None;
        }

        let date = match NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d") {
            Ok(date) => date,
            Err(_) => {
                warn!("Dropping {} row with unparseable date '{}'", pair, self.date);
                return None;
            }
        };

        let direction = non_empty(self.direction)
            .and_then(|s| s.parse::<Direction>().ok())
            .unwrap_or(Direction::Long);
        let status = match non_empty(self.status).as_deref().map(str::to_lowercase) {
            Some(s) if s == "closed" => TradeStatus::Closed,
            _ => TradeStatus::Open,
        };
        let market_type = non_empty(self.market_type)
            .and_then(|s| s.parse::<MarketType>().ok())
            .unwrap_or_default();
        let exit_type = non_empty(self.exit_type).and_then(|s| s.parse::<ExitType>().ok());
        let time = non_empty(self.time)
            .and_then(|s| parse_time(&s))
            .or_else(current_minute);

        let mut trade = TradeRecord::new(pair, direction, entry_price, size, date).with_id(id);
        trade.time = time;
        trade.exit_price = self.exit_price;
        trade.stop_loss = self.stop_loss;
        trade.take_profit = self.take_profit;
        trade.status = status;
        trade.strategy = non_empty(self.strategy).unwrap_or_else(|| DEFAULT_STRATEGY.to_string());
        trade.market_type = market_type;
        trade.exit_type = exit_type;
        trade.notes = self.notes.unwrap_or_default();
        trade.tags = self
            .tags
            .unwrap_or_default()
            .split(';')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        trade.normalize();

        if let Some(pnl) = self.pnl {
            if (pnl - trade.pnl).abs() > 1e-6 {
                debug!("Recomputed pnl for {}: file {} -> {}", trade.pair, pnl, trade.pnl);
            }
        }
        Some(trade)
    }
}

/// Parse CSV text into trades with freshly minted ids.
///
/// Unrecognized headers or a row with the wrong number of fields fail the
/// whole import; incomplete rows are dropped.
pub fn import_csv(text: &str) -> JournalResult<Vec<TradeRecord>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_reader(text.trim().as_bytes());

    let stamp = Utc::now().timestamp_millis();
    let mut trades = Vec::new();
    let mut dropped = 0;

    for (index, row) in reader.deserialize::<CsvRow>().enumerate() {
        let row = row?;
        match row.into_trade(format!("imported-{}-{}", stamp, index)) {
            Some(trade) => trades.push(trade),
            None => dropped += 1,
        }
    }

    info!("Parsed {} trades from CSV ({} rows dropped)", trades.len(), dropped);
    Ok(trades)
}
