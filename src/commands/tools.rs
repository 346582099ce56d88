//! Position sizing and FX rates

use anyhow::Result;
use trade_journal::market_data::MarketDataClient;
use trade_journal::risk::RiskCalculator;
use trade_journal::JournalConfig;

pub fn risk(balance: f64, risk_pct: f64, entry: f64, stop: f64) -> Result<()> {
    let sizing = RiskCalculator::default()
        .with_balance(balance)
        .with_risk_pct(risk_pct)
        .position_size(entry, stop)?;

    println!("Risk Amount:     {:.2}", sizing.risk_amount);
    println!("Position Size:   {:.6}", sizing.position_size);
    println!("Potential Loss:  {:.2}", sizing.potential_loss);
    Ok(())
}

pub async fn rates(config_path: String, base: Option<String>) -> Result<()> {
    let config = JournalConfig::load_or_default(&config_path)?;
    let client = MarketDataClient::from_config(&config.market_data)?;
    let base = base.unwrap_or_else(|| config.market_data.base_currency.clone());

    let quotes = client.latest_rates(&base).await?;
    println!("{:<10} {:<20} {:>14} {:>9}", "SYMBOL", "NAME", "PRICE", "CHANGE");
    for q in quotes {
        println!("{:<10} {:<20} {:>14.6} {:>8.2}%", q.symbol, q.name, q.price, q.change);
    }
    Ok(())
}
