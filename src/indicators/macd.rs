use super::moving_average::calculate_ema_series;

/// Moving Average Convergence Divergence output
///
/// `macd` is aligned with the slow EMA; `signal` and `histogram` are
/// aligned with each other and start `signal_period - 1` values into `macd`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MacdSeries {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

impl MacdSeries {
    pub fn last_histogram(&self) -> Option<f64> {
        self.histogram.last().copied()
    }
}

/// Calculate MACD: EMA(fast) - EMA(slow), an EMA(signal) of that line,
/// and the histogram (line minus signal)
///
/// Produces a histogram only once `prices.len() >= slow + signal - 1`.
pub fn calculate_macd(prices: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    if fast == 0 || signal == 0 || fast >= slow {
        return MacdSeries::default();
    }

    let fast_ema = calculate_ema_series(prices, fast);
    let slow_ema = calculate_ema_series(prices, slow);
    if slow_ema.is_empty() {
        return MacdSeries::default();
    }

    // fast_ema starts (slow - fast) prices earlier than slow_ema
    let offset = slow - fast;
    let macd: Vec<f64> = slow_ema
        .iter()
        .enumerate()
        .map(|(i, slow_value)| fast_ema[i + offset] - slow_value)
        .collect();

    let signal_line = calculate_ema_series(&macd, signal);
    let histogram = signal_line
        .iter()
        .enumerate()
        .map(|(i, signal_value)| macd[i + signal - 1] - signal_value)
        .collect();

    MacdSeries {
        macd,
        signal: signal_line,
        histogram,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macd_lengths() {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let result = calculate_macd(&prices, 12, 26, 9);

        assert_eq!(result.macd.len(), 60 - 26 + 1);
        assert_eq!(result.signal.len(), result.macd.len() - 9 + 1);
        assert_eq!(result.histogram.len(), result.signal.len());
    }

    #[test]
    fn test_macd_insufficient_for_histogram() {
        // 26 + 9 - 1 = 34 prices needed for the first histogram value
        let prices: Vec<f64> = (0..33).map(|i| 100.0 + i as f64).collect();
        let result = calculate_macd(&prices, 12, 26, 9);
        assert!(!result.macd.is_empty());
        assert!(result.histogram.is_empty());

        let prices: Vec<f64> = (0..34).map(|i| 100.0 + i as f64).collect();
        let result = calculate_macd(&prices, 12, 26, 9);
        assert_eq!(result.histogram.len(), 1);
    }

    #[test]
    fn test_macd_flat_prices() {
        let prices = vec![42.0; 50];
        let result = calculate_macd(&prices, 12, 26, 9);
        assert!(result.macd.iter().all(|&v| v.abs() < 1e-12));
        assert_eq!(result.last_histogram().map(|h| h.abs() < 1e-12), Some(true));
    }

    #[test]
    fn test_macd_accelerating_rally_has_positive_histogram() {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 * 1.01_f64.powi(i)).collect();
        let result = calculate_macd(&prices, 12, 26, 9);

        assert!(result.macd.last().copied().unwrap() > 0.0);
        assert!(result.last_histogram().unwrap() > 0.0);
    }

    #[test]
    fn test_macd_invalid_periods() {
        let prices: Vec<f64> = (0..60).map(|i| i as f64).collect();
        assert_eq!(calculate_macd(&prices, 26, 12, 9), MacdSeries::default());
        assert_eq!(calculate_macd(&prices, 12, 26, 0), MacdSeries::default());
    }
}
