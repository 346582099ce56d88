//! Sample journal shown on first launch

use chrono::{NaiveDate, NaiveTime};

use crate::types::{Direction, ExitType, MarketType, TradeRecord};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default()
}

/// Trades returned by a load when the store holds nothing
pub fn default_trades() -> Vec<TradeRecord> {
    vec![
        TradeRecord::new("BTC/USD", Direction::Long, 47250.80, 0.5, date(2024, 2, 20))
            .with_id("1")
            .with_time(time(14, 30))
            .with_stops(Some(46800.0), Some(48500.0))
            .with_strategy("Trend Following")
            .with_market_type(MarketType::Crypto)
            .with_notes("Followed breakout pattern with strong volume confirmation")
            .with_tags(["breakout", "trend"])
            .closed_at(48500.20, Some(ExitType::TakeProfit)),
        TradeRecord::new("ETH/USD", Direction::Short, 2850.30, 2.0, date(2024, 2, 19))
            .with_id("2")
            .with_time(time(10, 15))
            .with_stops(Some(2900.0), Some(2750.0))
            .with_strategy("Range Trading")
            .with_market_type(MarketType::Crypto)
            .with_notes("Shorted at resistance with overbought RSI")
            .with_tags(["resistance", "overbought"])
            .closed_at(2750.80, Some(ExitType::TakeProfit)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_seed_trades_are_valid() {
        let seed = default_trades();
        assert_eq!(seed.len(), 2);
        for trade in &seed {
            assert!(trade.validate().is_ok(), "{:?}", trade.validate());
        }
        assert_relative_eq!(seed[0].pnl, 624.70, epsilon = 1e-9);
        assert_relative_eq!(seed[1].pnl, 199.0, epsilon = 1e-9);
    }
}
