//! Position sizing
//!
//! Sizes a trade so that hitting the stop loses a fixed share of the
//! account:
//! ```text
//! risk_amount   = balance * risk_pct / 100
//! position_size = risk_amount / |entry - stop|
//! ```
//! All values are dimensionless; balance and prices must share a currency.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RiskInputError {
    #[error("account balance ({0}) must be >= 0")]
    NegativeBalance(f64),

    #[error("risk percentage ({0}) must be between 0 and 100")]
    RiskOutOfRange(f64),

    #[error("prices must be positive: entry={entry}, stop={stop}")]
    NonPositivePrice { entry: f64, stop: f64 },
}

/// Result of a sizing calculation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSizing {
    pub position_size: f64,
    pub risk_amount: f64,
    pub potential_loss: f64,
}

/// Account-level sizing inputs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskCalculator {
    pub account_balance: f64,
    /// Percent of balance at risk per trade (1.0 = 1%)
    pub risk_pct: f64,
}

impl Default for RiskCalculator {
    fn default() -> Self {
        Self {
            account_balance: 10_000.0,
            risk_pct: 1.0,
        }
    }
}

impl RiskCalculator {
    pub fn with_balance(mut self, balance: f64) -> Self {
        self.account_balance = balance;
        self
    }

    pub fn with_risk_pct(mut self, risk_pct: f64) -> Self {
        self.risk_pct = risk_pct;
        self
    }

    pub fn validate(&self) -> Result<(), RiskInputError> {
        if !(self.account_balance >= 0.0) {
            return Err(RiskInputError::NegativeBalance(self.account_balance));
        }
        if !(0.0..=100.0).contains(&self.risk_pct) {
            return Err(RiskInputError::RiskOutOfRange(self.risk_pct));
        }
        Ok(())
    }

    pub fn risk_amount(&self) -> f64 {
        self.account_balance * (self.risk_pct / 100.0)
    }

    /// Size for a trade entering at `entry` with its stop at `stop`.
    ///
    /// A stop equal to the entry yields a zero position size.
    pub fn position_size(&self, entry: f64, stop: f64) -> Result<PositionSizing, RiskInputError> {
        self.validate()?;
        if !(entry > 0.0) || !(stop > 0.0) {
            return Err(RiskInputError::NonPositivePrice { entry, stop });
        }

        let risk_amount = self.risk_amount();
        let stop_distance = (entry - stop).abs();
        let position_size = if stop_distance > 0.0 {
            risk_amount / stop_distance
        } else {
            0.0
        };

        Ok(PositionSizing {
            position_size,
            risk_amount,
            potential_loss: risk_amount,
        })
    }
}

/// Convenience wrapper over [`RiskCalculator::position_size`]
pub fn position_size(
    balance: f64,
    risk_pct: f64,
    entry: f64,
    stop: f64,
) -> Result<PositionSizing, RiskInputError> {
    RiskCalculator::default()
        .with_balance(balance)
        .with_risk_pct(risk_pct)
        .position_size(entry, stop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_position_sizing() {
        // Risk = 10,000 * 1% = 100, stop distance = 5 -> 20 units
        let sizing = position_size(10_000.0, 1.0, 100.0, 95.0).unwrap();
        assert_relative_eq!(sizing.risk_amount, 100.0);
        assert_relative_eq!(sizing.position_size, 20.0);
        assert_relative_eq!(sizing.potential_loss, 100.0);
    }

    #[test]
    fn test_short_stop_above_entry() {
        let sizing = position_size(10_000.0, 2.0, 100.0, 104.0).unwrap();
        assert_relative_eq!(sizing.position_size, 50.0);
    }

    #[test]
    fn test_zero_stop_distance() {
        let sizing = position_size(10_000.0, 1.0, 100.0, 100.0).unwrap();
        assert_eq!(sizing.position_size, 0.0);
    }

    #[test]
    fn test_currency_independence() {
        const USD_TO_INR: f64 = 85.0;
        let usd = position_size(100_000.0, 1.5, 90_000.0, 87_000.0).unwrap();
        let inr = position_size(100_000.0 * USD_TO_INR, 1.5, 90_000.0 * USD_TO_INR, 87_000.0 * USD_TO_INR).unwrap();
        assert_relative_eq!(usd.position_size, inr.position_size, epsilon = 1e-9);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert_eq!(
            position_size(-1.0, 1.0, 100.0, 95.0),
            Err(RiskInputError::NegativeBalance(-1.0))
        );
        assert_eq!(
            position_size(1_000.0, 150.0, 100.0, 95.0),
            Err(RiskInputError::RiskOutOfRange(150.0))
        );
        assert!(position_size(1_000.0, 1.0, 0.0, 95.0).is_err());
    }
}
