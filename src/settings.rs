use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Errors raised while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("invalid configuration value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Within (0, 100); false for NaN
fn is_open_percentage(value: f64) -> bool {
    value > 0.0 && value < 100.0
}

/// Process-wide trading parameters
///
/// Loaded once at startup and never mutated afterwards.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TradingConfig {
    // Risk management (percentages, 1.0 = 1%)
    pub base_risk_percentage: f64,
    pub max_risk_percentage: f64,
    pub stop_loss_percentage: f64,
    pub take_profit_percentage: f64,

    pub trading_pairs: Vec<String>,
    pub timeframes: Vec<String>,

    // Indicators
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub ema_periods: [usize; 3],
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,

    // Volatility (window in samples, threshold as a fraction)
    pub volatility_window: usize,
    pub volatility_threshold: f64,

    pub history_capacity: usize,
    pub confidence_threshold: f64,

    // Scheduling
    pub cycle_interval_ms: u64,
    pub call_timeout_ms: u64,
    pub reconcile_every_cycles: u64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            base_risk_percentage: 1.0,
            max_risk_percentage: 5.0,
            stop_loss_percentage: 2.0,
            take_profit_percentage: 5.0,
            trading_pairs: vec!["BTC/USDT".to_string(), "XAUUSD".to_string()],
            timeframes: vec!["1m".to_string(), "5m".to_string(), "15m".to_string()],
            rsi_period: 14,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            ema_periods: [9, 21, 50],
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            volatility_window: 24,
            volatility_threshold: 2.0,
            history_capacity: 100,
            confidence_threshold: 0.7,
            cycle_interval_ms: 1000,
            call_timeout_ms: 5000,
            reconcile_every_cycles: 10,
        }
    }
}

impl TradingConfig {
    /// Load configuration from an optional TOML file overlaid with
    /// `WARTHOG__*` environment variables, then validate it.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        } else {
            builder = builder.add_source(::config::File::with_name("config/default").required(false));
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix("WARTHOG")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("trading_pairs")
                    .with_list_parse_key("timeframes")
                    .try_parsing(true),
            )
            .build()?;

        let config: TradingConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range values before anything uses them
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_risk_percentage.is_nan() || self.base_risk_percentage <= 0.0 {
            return Err(invalid("base_risk_percentage", "must be positive"));
        }
        if self.max_risk_percentage.is_nan() || self.max_risk_percentage < self.base_risk_percentage {
            return Err(invalid(
                "max_risk_percentage",
                format!(
                    "{} is below base_risk_percentage {}",
                    self.max_risk_percentage, self.base_risk_percentage
                ),
            ));
        }
        if !is_open_percentage(self.stop_loss_percentage) {
            return Err(invalid("stop_loss_percentage", "must be within (0, 100)"));
        }
        if !is_open_percentage(self.take_profit_percentage) {
            return Err(invalid("take_profit_percentage", "must be within (0, 100)"));
        }

        if self.trading_pairs.is_empty() {
            return Err(invalid("trading_pairs", "at least one symbol is required"));
        }
        let mut seen = HashSet::new();
        for symbol in &self.trading_pairs {
            if symbol.trim().is_empty() {
                return Err(invalid("trading_pairs", "symbols must not be blank"));
            }
            if !seen.insert(symbol.as_str()) {
                return Err(invalid("trading_pairs", format!("duplicate symbol {}", symbol)));
            }
        }
        if self.timeframes.is_empty() {
            return Err(invalid("timeframes", "at least one timeframe is required"));
        }

        if self.rsi_period == 0 {
            return Err(invalid("rsi_period", "must be positive"));
        }
        let rsi_bounds_ordered = 0.0 <= self.rsi_oversold
            && self.rsi_oversold < self.rsi_overbought
            && self.rsi_overbought <= 100.0;
        if !rsi_bounds_ordered {
            return Err(invalid(
                "rsi_overbought",
                "expected 0 <= rsi_oversold < rsi_overbought <= 100",
            ));
        }
        let [short, mid, long] = self.ema_periods;
        if short == 0 || short >= mid || mid >= long {
            return Err(invalid(
                "ema_periods",
                format!("expected positive ascending periods, got {:?}", self.ema_periods),
            ));
        }
        if self.macd_fast == 0 || self.macd_signal == 0 || self.macd_fast >= self.macd_slow {
            return Err(invalid(
                "macd_fast",
                "expected 0 < macd_fast < macd_slow and macd_signal > 0",
            ));
        }

        if self.volatility_window < 2 {
            return Err(invalid("volatility_window", "needs at least 2 samples"));
        }
        if self.volatility_threshold.is_nan() || self.volatility_threshold < 0.0 {
            return Err(invalid("volatility_threshold", "must be non-negative"));
        }
        if self.history_capacity == 0 {
            return Err(invalid("history_capacity", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(invalid("confidence_threshold", "must be within [0, 1]"));
        }
        if self.cycle_interval_ms == 0 {
            return Err(invalid("cycle_interval_ms", "must be positive"));
        }
        if self.call_timeout_ms == 0 {
            return Err(invalid("call_timeout_ms", "must be positive"));
        }

        Ok(())
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}
