//! Journal performance statistics
//!
//! Summary figures, the cumulative PnL curve and the timeframe/strategy/
//! market filters used to slice the journal.

use chrono::{Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::{MarketType, Money, ParseLabelError, TradeRecord};

/// Summary statistics over closed trades
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percentage of closed trades with positive PnL
    pub win_rate: f64,
    #[serde(rename = "totalPnL")]
    pub total_pnl: f64,
    #[serde(rename = "avgPnL")]
    pub avg_pnl: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    /// Gross profit over gross loss; infinite with profits and no losses
    pub profit_factor: f64,
}

impl TradeStats {
    pub fn from_trades(trades: &[TradeRecord]) -> Self {
        let closed: Vec<&TradeRecord> = trades.iter().filter(|t| t.is_closed()).collect();
        if closed.is_empty() {
            return Self::default();
        }

        let winners: Vec<f64> = closed.iter().map(|t| t.pnl).filter(|p| *p > 0.0).collect();
        let losers: Vec<f64> = closed.iter().map(|t| t.pnl).filter(|p| *p < 0.0).collect();

        let total_pnl = Money::sum_f64(closed.iter().map(|t| t.pnl));
        let gross_profit: f64 = winners.iter().sum();
        let gross_loss: f64 = losers.iter().map(|p| p.abs()).sum();

        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let best_trade = closed.iter().map(|t| t.pnl).fold(f64::NEG_INFINITY, f64::max);
        let worst_trade = closed.iter().map(|t| t.pnl).fold(f64::INFINITY, f64::min);

        Self {
            total_trades: closed.len(),
            winning_trades: winners.len(),
            losing_trades: losers.len(),
            win_rate: winners.len() as f64 / closed.len() as f64 * 100.0,
            total_pnl,
            avg_pnl: total_pnl / closed.len() as f64,
            best_trade,
            worst_trade,
            profit_factor,
        }
    }
}

/// Point on the cumulative PnL curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub pnl: f64,
}

/// Running PnL of closed trades, oldest first
pub fn equity_curve(trades: &[TradeRecord]) -> Vec<EquityPoint> {
    let mut closed: Vec<&TradeRecord> = trades.iter().filter(|t| t.is_closed()).collect();
    closed.sort_by_key(|t| t.date);

    // Decimal running total until it leaves decimal range, then f64
    let mut exact = Some(Money::ZERO);
    let mut float = 0.0;
    closed
        .into_iter()
        .map(|t| {
            float += t.pnl;
            exact = exact.and_then(|acc| acc.checked_add(Money::try_from_f64(t.pnl)?));
            EquityPoint {
                date: t.date,
                pnl: exact.map(Money::to_f64).unwrap_or(float),
            }
        })
        .collect()
}

/// Lookback window ending at a reference date
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Timeframe {
    Week,
    #[default]
    Month,
    Quarter,
    Year,
    All,
}

impl Timeframe {
    /// First date inside the window, `None` for [`Timeframe::All`]
    pub fn start(self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Week => Some(today - Duration::days(7)),
            Self::Month => today.checked_sub_months(Months::new(1)),
            Self::Quarter => today.checked_sub_months(Months::new(3)),
            Self::Year => today.checked_sub_months(Months::new(12)),
            Self::All => None,
        }
    }

    pub fn contains(self, date: NaiveDate, today: NaiveDate) -> bool {
        match self.start(today) {
            Some(start) => date >= start && date <= today,
            None => true,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Week => "1W",
            Self::Month => "1M",
            Self::Quarter => "3M",
            Self::Year => "1Y",
            Self::All => "ALL",
        };
        write!(f, "{}", label)
    }
}

impl FromStr for Timeframe {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "1W" => Ok(Self::Week),
            "1M" => Ok(Self::Month),
            "3M" => Ok(Self::Quarter),
            "1Y" => Ok(Self::Year),
            "ALL" => Ok(Self::All),
            _ => Err(ParseLabelError {
                kind: "timeframe",
                value: s.to_string(),
            }),
        }
    }
}

/// Journal list filter
#[derive(Debug, Clone, Default)]
pub struct TradeFilter {
    /// Case-insensitive substring of the strategy label
    pub strategy: Option<String>,
    pub market_type: Option<MarketType>,
    pub timeframe: Option<Timeframe>,
}

impl TradeFilter {
    pub fn matches(&self, trade: &TradeRecord, today: NaiveDate) -> bool {
        if let Some(strategy) = &self.strategy {
            if !trade.strategy.to_lowercase().contains(&strategy.to_lowercase()) {
                return false;
            }
        }
        if let Some(market_type) = self.market_type {
            if trade.market_type != market_type {
                return false;
            }
        }
        match self.timeframe {
            Some(tf) => tf.contains(trade.date, today),
            None => true,
        }
    }

    pub fn apply<'a>(&self, trades: &'a [TradeRecord], today: NaiveDate) -> Vec<&'a TradeRecord> {
        trades.iter().filter(|t| self.matches(t, today)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;
    use approx::assert_relative_eq;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn closed(date: &str, entry: f64, exit: f64) -> TradeRecord {
        TradeRecord::new("BTC/USD", Direction::Long, entry, 1.0, d(date)).closed_at(exit, None)
    }

    #[test]
    fn test_empty_stats_are_zero() {
        assert_eq!(TradeStats::from_trades(&[]), TradeStats::default());

        let open = TradeRecord::new("BTC/USD", Direction::Long, 1.0, 1.0, d("2024-01-01"));
        assert_eq!(TradeStats::from_trades(&[open]).total_trades, 0);
    }

    #[test]
    fn test_summary_statistics() {
        let trades = vec![
            closed("2024-01-01", 100.0, 130.0),
            closed("2024-01-02", 100.0, 90.0),
            closed("2024-01-03", 100.0, 110.0),
            TradeRecord::new("BTC/USD", Direction::Long, 1.0, 1.0, d("2024-01-04")),
        ];
        let stats = TradeStats::from_trades(&trades);

        assert_eq!(stats.total_trades, 3);
        assert_eq!(stats.winning_trades, 2);
        assert_eq!(stats.losing_trades, 1);
        assert_relative_eq!(stats.win_rate, 200.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(stats.total_pnl, 30.0);
        assert_relative_eq!(stats.avg_pnl, 10.0);
        assert_relative_eq!(stats.best_trade, 30.0);
        assert_relative_eq!(stats.worst_trade, -10.0);
        assert_relative_eq!(stats.profit_factor, 4.0);
    }

    #[test]
    fn test_profit_factor_without_losses() {
        let stats = TradeStats::from_trades(&[closed("2024-01-01", 100.0, 110.0)]);
        assert!(stats.profit_factor.is_infinite());
    }

    #[test]
    fn test_huge_pnl_does_not_overflow() {
        let trades = vec![
            closed("2024-01-01", 1e15, 2e15),
            TradeRecord::new("BTC/USD", Direction::Long, 1e15, 1e15, d("2024-01-02")).closed_at(2e15, None),
        ];
        let stats = TradeStats::from_trades(&trades);
        assert_relative_eq!(stats.total_pnl, 1e30 + 1e15, max_relative = 1e-12);

        let curve = equity_curve(&trades);
        assert_eq!(curve[0].pnl, 1e15);
        assert_relative_eq!(curve[1].pnl, 1e30 + 1e15, max_relative = 1e-12);
    }

    #[test]
    fn test_equity_curve_is_chronological() {
        let trades = vec![
            closed("2024-01-03", 100.0, 105.0),
            closed("2024-01-01", 100.0, 110.0),
            closed("2024-01-02", 100.0, 97.0),
        ];
        let curve = equity_curve(&trades);
        let values: Vec<f64> = curve.iter().map(|p| p.pnl).collect();
        assert_eq!(curve[0].date, d("2024-01-01"));
        assert_eq!(values, vec![10.0, 7.0, 12.0]);
    }

    #[test]
    fn test_timeframe_window() {
        let today = d("2024-03-31");
        assert!(Timeframe::Week.contains(d("2024-03-25"), today));
        assert!(!Timeframe::Week.contains(d("2024-03-20"), today));
        assert_eq!(Timeframe::Month.start(today), Some(d("2024-02-29")));
        assert!(Timeframe::All.contains(d("1999-01-01"), today));
        assert_eq!("3m".parse::<Timeframe>().unwrap(), Timeframe::Quarter);
        assert_eq!(Timeframe::Year.to_string(), "1Y");
    }

    #[test]
    fn test_filter_by_strategy_and_market() {
        let trades = vec![
            closed("2024-01-01", 1.0, 2.0).with_strategy("Trend Following"),
            closed("2024-01-02", 1.0, 2.0)
                .with_strategy("Range Trading")
                .with_market_type(MarketType::Forex),
        ];
        let today = d("2024-01-10");

        let trend = TradeFilter {
            strategy: Some("trend".to_string()),
            ..TradeFilter::default()
        };
        assert_eq!(trend.apply(&trades, today).len(), 1);

        let forex = TradeFilter {
            market_type: Some(MarketType::Forex),
            ..TradeFilter::default()
        };
        let matched = forex.apply(&trades, today);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].strategy, "Range Trading");
    }
}
