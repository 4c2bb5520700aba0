use serde::Serialize;

use crate::settings::TradingConfig;

/// Risk sizing derived for one symbol in one cycle
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct RiskParameters {
    /// Percentage of the account balance put at risk (1.0 = 1%)
    pub risk_percentage: f64,
    pub stop_loss_price: f64,
    /// Position size in units of the instrument
    pub max_position_size: f64,
}

/// Turns volatility and account balance into risk parameters
#[derive(Debug, Clone)]
pub struct DynamicRiskCalculator {
    base_risk_percentage: f64,
    max_risk_percentage: f64,
    stop_loss_percentage: f64,
    volatility_threshold: f64,
}

impl DynamicRiskCalculator {
    pub fn new(config: &TradingConfig) -> Self {
        Self {
            base_risk_percentage: config.base_risk_percentage,
            max_risk_percentage: config.max_risk_percentage,
            stop_loss_percentage: config.stop_loss_percentage,
            volatility_threshold: config.volatility_threshold,
        }
    }

    /// Compute risk parameters for the current price
    ///
    /// Below the volatility threshold risk grows with volatility up to the
    /// maximum; at or above it risk is damped but never below the base.
    /// The stop-loss is always placed below the current price.
    pub fn compute(&self, current_price: f64, volatility: f64, account_balance: f64) -> RiskParameters {
        let risk_percentage = self.risk_percentage(volatility);

        RiskParameters {
            risk_percentage,
            stop_loss_price: current_price * (1.0 - self.stop_loss_percentage / 100.0),
            max_position_size: calculate_position_size(account_balance, risk_percentage, current_price),
        }
    }

    pub fn risk_percentage(&self, volatility: f64) -> f64 {
        let base = self.base_risk_percentage;

        if volatility < self.volatility_threshold {
            (base * (1.0 + volatility)).min(self.max_risk_percentage)
        } else {
            base.max(base * (1.0 - volatility / 10.0))
        }
    }

    /// Where a risk percentage sits between base and max, on a 0-100 scale
    pub fn risk_level(&self, risk_percentage: f64) -> f64 {
        let span = self.max_risk_percentage - self.base_risk_percentage;
        if span <= 0.0 {
            return 0.0;
        }

        ((risk_percentage - self.base_risk_percentage) / span * 100.0).clamp(0.0, 100.0)
    }
}

/// Units affordable when risking `risk_percentage` of the balance
pub fn calculate_position_size(account_balance: f64, risk_percentage: f64, current_price: f64) -> f64 {
    if current_price <= 0.0 || account_balance <= 0.0 {
        return 0.0;
    }

    (account_balance * (risk_percentage / 100.0)) / current_price
}
