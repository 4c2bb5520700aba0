use serde::Serialize;

use super::Strategy;
use crate::indicators::{calculate_ema_series, calculate_macd, calculate_rsi_series};
use crate::models::{SignalDirection, Trend};
use crate::settings::TradingConfig;

// Confidence contributions
const EXTREME_RSI_WEIGHT: f64 = 0.3;
const UPTREND_WEIGHT: f64 = 0.3;
const STRONG_MACD_WEIGHT: f64 = 0.4;
const STRONG_MACD_HISTOGRAM: f64 = 0.5;

/// Configuration for signal generation
#[derive(Debug, Clone, PartialEq)]
pub struct SignalConfig {
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    /// Short, mid and long EMA periods; trend compares short against long
    pub ema_periods: [usize; 3],
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self::from(&TradingConfig::default())
    }
}

impl From<&TradingConfig> for SignalConfig {
    fn from(config: &TradingConfig) -> Self {
        Self {
            rsi_period: config.rsi_period,
            rsi_oversold: config.rsi_oversold,
            rsi_overbought: config.rsi_overbought,
            ema_periods: config.ema_periods,
            macd_fast: config.macd_fast,
            macd_slow: config.macd_slow,
            macd_signal: config.macd_signal,
        }
    }
}

impl SignalConfig {
    /// Longest lookback any indicator needs, plus one
    ///
    /// The MACD histogram needs `slow + signal - 1` prices before its
    /// first value, so it counts as an indicator period here.
    pub fn min_samples_required(&self) -> usize {
        let macd_period = self.macd_slow + self.macd_signal.saturating_sub(1);
        let longest_ema = self.ema_periods.iter().copied().max().unwrap_or(0);

        self.rsi_period.max(longest_ema).max(macd_period) + 1
    }
}

/// EMA values for one configured period
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmaSeries {
    pub period: usize,
    pub values: Vec<f64>,
}

/// Intermediate indicator series behind a signal
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IndicatorValues {
    pub rsi: Vec<f64>,
    pub ema: Vec<EmaSeries>,
    pub macd_histogram: Vec<f64>,
    pub trend: Trend,
}

impl IndicatorValues {
    pub fn last_rsi(&self) -> Option<f64> {
        self.rsi.last().copied()
    }

    pub fn last_macd_histogram(&self) -> Option<f64> {
        self.macd_histogram.last().copied()
    }
}

/// Directional signal with its heuristic confidence
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SignalResult {
    pub direction: SignalDirection,
    pub confidence: f64,
    /// `None` when the history was too short to compute indicators
    pub indicators: Option<IndicatorValues>,
}

impl SignalResult {
    /// Degenerate output for histories that are too short
    pub fn neutral() -> Self {
        Self {
            direction: SignalDirection::Neutral,
            confidence: 0.0,
            indicators: None,
        }
    }

    /// Whether this signal should open a position at `threshold`
    pub fn is_actionable(&self, threshold: f64) -> bool {
        self.confidence > threshold && self.direction != SignalDirection::Neutral
    }

    pub fn trend(&self) -> Option<Trend> {
        self.indicators.as_ref().map(|i| i.trend)
    }
}

/// Uptrend when the short EMA closes above the long EMA
pub fn determine_trend(short_ema: f64, long_ema: f64) -> Trend {
    if short_ema > long_ema {
        Trend::Uptrend
    } else {
        Trend::Downtrend
    }
}

/// Directional rule over the latest indicator readings
pub fn classify_direction(
    trend: Trend,
    rsi: f64,
    macd_histogram: f64,
    config: &SignalConfig,
) -> SignalDirection {
    match trend {
        Trend::Uptrend if rsi < config.rsi_overbought && macd_histogram > 0.0 => {
            SignalDirection::Buy
        }
        Trend::Downtrend if rsi > config.rsi_oversold && macd_histogram < 0.0 => {
            SignalDirection::Sell
        }
        _ => SignalDirection::Neutral,
    }
}

/// Additive confidence score
///
/// Only an uptrend earns the trend contribution; a downtrend adds nothing
/// even when it backs a SELL.
pub fn score_confidence(trend: Trend, rsi: f64, macd_histogram: f64, config: &SignalConfig) -> f64 {
    let mut confidence = 0.0;

    if rsi < config.rsi_oversold || rsi > config.rsi_overbought {
        confidence += EXTREME_RSI_WEIGHT;
    }

    if trend == Trend::Uptrend {
        confidence += UPTREND_WEIGHT;
    }

    if macd_histogram.abs() > STRONG_MACD_HISTOGRAM {
        confidence += STRONG_MACD_WEIGHT;
    }

    confidence
}

/// Composite RSI / EMA / MACD signal generator
#[derive(Debug, Clone, Default)]
pub struct SignalGenerator {
    config: SignalConfig,
}

impl SignalGenerator {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Compute every indicator series, or `None` if any comes out empty
    pub fn compute_indicators(&self, prices: &[f64]) -> Option<IndicatorValues> {
        let rsi = calculate_rsi_series(prices, self.config.rsi_period);

        let ema: Vec<EmaSeries> = self
            .config
            .ema_periods
            .iter()
            .map(|&period| EmaSeries {
                period,
                values: calculate_ema_series(prices, period),
            })
            .collect();

        let macd = calculate_macd(
            prices,
            self.config.macd_fast,
            self.config.macd_slow,
            self.config.macd_signal,
        );

        let short_ema = ema.first()?.values.last().copied()?;
        let long_ema = ema.last()?.values.last().copied()?;
        if rsi.is_empty() || macd.histogram.is_empty() {
            return None;
        }

        Some(IndicatorValues {
            rsi,
            ema,
            macd_histogram: macd.histogram,
            trend: determine_trend(short_ema, long_ema),
        })
    }
}

impl Strategy for SignalGenerator {
    fn analyze(&self, prices: &[f64]) -> SignalResult {
        if prices.len() < self.min_samples_required() {
            tracing::debug!(
                samples = prices.len(),
                needed = self.min_samples_required(),
                "Not enough history for indicators"
            );
            return SignalResult::neutral();
        }

        let Some(indicators) = self.compute_indicators(prices) else {
            return SignalResult::neutral();
        };

        let (Some(rsi), Some(histogram)) =
            (indicators.last_rsi(), indicators.last_macd_histogram())
        else {
            return SignalResult::neutral();
        };

        let direction = classify_direction(indicators.trend, rsi, histogram, &self.config);
        let confidence = score_confidence(indicators.trend, rsi, histogram, &self.config);

        tracing::debug!(
            rsi,
            macd_histogram = histogram,
            trend = ?indicators.trend,
            ?direction,
            confidence,
            "Signal analysis"
        );

        SignalResult {
            direction,
            confidence,
            indicators: Some(indicators),
        }
    }

    fn name(&self) -> &str {
        "SignalGenerator"
    }

    fn min_samples_required(&self) -> usize {
        self.config.min_samples_required()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SignalConfig {
        SignalConfig::default()
    }

    #[test]
    fn test_min_samples_required() {
        // Longest EMA (50) + 1
        assert_eq!(config().min_samples_required(), 51);

        let short = SignalConfig {
            ema_periods: [3, 5, 8],
            ..SignalConfig::default()
        };
        // MACD histogram needs 26 + 9 - 1 = 34
        assert_eq!(short.min_samples_required(), 35);
    }

    #[test]
    fn test_buy_on_uptrend_neutral_rsi_positive_macd() {
        let direction = classify_direction(Trend::Uptrend, 50.0, 0.2, &config());
        assert_eq!(direction, SignalDirection::Buy);
    }

    #[test]
    fn test_sell_on_downtrend_neutral_rsi_negative_macd() {
        let direction = classify_direction(Trend::Downtrend, 50.0, -0.2, &config());
        assert_eq!(direction, SignalDirection::Sell);
    }

    #[test]
    fn test_overbought_blocks_buy_but_adds_confidence() {
        let direction = classify_direction(Trend::Uptrend, 75.0, 0.2, &config());
        assert_eq!(direction, SignalDirection::Neutral);

        let confidence = score_confidence(Trend::Uptrend, 75.0, 0.2, &config());
        // +0.3 overbought, +0.3 uptrend, histogram too small for +0.4
        assert!((confidence - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_oversold_blocks_sell() {
        let direction = classify_direction(Trend::Downtrend, 25.0, -1.0, &config());
        assert_eq!(direction, SignalDirection::Neutral);
    }

    #[test]
    fn test_mismatched_macd_is_neutral() {
        assert_eq!(
            classify_direction(Trend::Uptrend, 50.0, -0.1, &config()),
            SignalDirection::Neutral
        );
        assert_eq!(
            classify_direction(Trend::Downtrend, 50.0, 0.1, &config()),
            SignalDirection::Neutral
        );
    }

    #[test]
    fn test_confidence_rewards_only_uptrend() {
        let up = score_confidence(Trend::Uptrend, 50.0, 1.0, &config());
        let down = score_confidence(Trend::Downtrend, 50.0, -1.0, &config());

        assert!((up - 0.7).abs() < 1e-12);
        assert!((down - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_strongest_sell_is_not_actionable_at_default_threshold() {
        let confidence = score_confidence(Trend::Downtrend, 80.0, -2.0, &config());
        let signal = SignalResult {
            direction: classify_direction(Trend::Downtrend, 80.0, -2.0, &config()),
            confidence,
            indicators: None,
        };

        assert_eq!(signal.direction, SignalDirection::Sell);
        assert!((confidence - 0.7).abs() < 1e-12);
        assert!(!signal.is_actionable(0.7));
    }

    #[test]
    fn test_confidence_maximum() {
        let confidence = score_confidence(Trend::Uptrend, 80.0, 2.0, &config());
        assert!((confidence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_short_history_is_neutral() {
        let generator = SignalGenerator::default();
        let prices: Vec<f64> = (0..50).map(|i| 100.0 + i as f64).collect();

        let result = generator.analyze(&prices);
        assert_eq!(result, SignalResult::neutral());
        assert!(!result.is_actionable(0.7));
    }

    #[test]
    fn test_accelerating_rally_is_overbought() {
        let generator = SignalGenerator::default();
        let prices: Vec<f64> = (0..80).map(|i| 100.0 * 1.01_f64.powi(i)).collect();

        let result = generator.analyze(&prices);
        let indicators = result.indicators.as_ref().unwrap();

        assert_eq!(indicators.trend, Trend::Uptrend);
        assert_eq!(indicators.last_rsi(), Some(100.0));
        assert!(indicators.last_macd_histogram().unwrap() > 0.0);
        // RSI guard fails, so no entry despite the uptrend
        assert_eq!(result.direction, SignalDirection::Neutral);
        assert!(result.confidence >= 0.6);
    }

    #[test]
    fn test_steady_decline_is_oversold() {
        let generator = SignalGenerator::default();
        let prices: Vec<f64> = (0..80).map(|i| 100.0 * 0.99_f64.powi(i)).collect();

        let result = generator.analyze(&prices);

        assert_eq!(result.trend(), Some(Trend::Downtrend));
        assert_eq!(result.direction, SignalDirection::Neutral);
        assert!(result.confidence >= 0.3);
    }

    #[test]
    fn test_indicator_series_per_period() {
        let generator = SignalGenerator::default();
        let prices: Vec<f64> = (0..100).map(|i| 100.0 + (i as f64 * 0.3).sin()).collect();

        let indicators = generator.compute_indicators(&prices).unwrap();
        let periods: Vec<usize> = indicators.ema.iter().map(|e| e.period).collect();

        assert_eq!(periods, vec![9, 21, 50]);
        assert_eq!(indicators.ema[0].values.len(), 92);
        assert_eq!(indicators.ema[2].values.len(), 51);
        assert_eq!(indicators.rsi.len(), 86);
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let generator = SignalGenerator::default();
        let prices: Vec<f64> = (0..100).map(|i| 100.0 + (i as f64 * 0.2).sin() * 3.0).collect();

        assert_eq!(generator.analyze(&prices), generator.analyze(&prices));
    }

    #[test]
    fn test_actionable_threshold_is_strict() {
        let result = SignalResult {
            direction: SignalDirection::Buy,
            confidence: 0.7,
            indicators: None,
        };
        assert!(!result.is_actionable(0.7));

        let result = SignalResult {
            confidence: 0.75,
            ..result
        };
        assert!(result.is_actionable(0.7));
    }
}
