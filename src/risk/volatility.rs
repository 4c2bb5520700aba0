use std::collections::HashMap;

use crate::execution::price_history::RollingWindow;

/// Rolling volatility per symbol
///
/// Keeps its own bounded window, independent of the price history store,
/// and reports the population standard deviation of simple returns as a
/// fraction (0.01 = 1%).
#[derive(Debug, Clone)]
pub struct VolatilityEstimator {
    windows: HashMap<String, RollingWindow>,
    window: usize,
}

impl VolatilityEstimator {
    pub fn new(window: usize) -> Self {
        Self {
            windows: HashMap::new(),
            window,
        }
    }

    /// Record a price and return the volatility over the current window
    pub fn update(&mut self, symbol: &str, price: f64) -> f64 {
        let window = self.window;
        let prices = self
            .windows
            .entry(symbol.to_string())
            .or_insert_with(|| RollingWindow::new(window));
        prices.push(price);

        calculate_volatility(&prices.to_vec())
    }

    /// Volatility of the current window without recording anything
    pub fn current(&self, symbol: &str) -> f64 {
        self.windows
            .get(symbol)
            .map(|prices| calculate_volatility(&prices.to_vec()))
            .unwrap_or(0.0)
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

/// Population standard deviation of `(p[i] - p[i-1]) / p[i-1]`
///
/// Returns 0.0 for fewer than two prices.
pub fn calculate_volatility(prices: &[f64]) -> f64 {
    if prices.len() < 2 {
        return 0.0;
    }

    let returns: Vec<f64> = prices
        .windows(2)
        .map(|pair| (pair[1] - pair[0]) / pair[0])
        .collect();

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;

    variance.sqrt()
}
