use std::collections::{HashMap, VecDeque};

/// Bounded FIFO window of prices for one symbol
#[derive(Debug, Clone)]
pub struct RollingWindow {
    prices: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            prices: VecDeque::with_capacity(capacity.saturating_add(1)),
            capacity,
        }
    }

    /// Append a price, evicting the oldest while over capacity
    pub fn push(&mut self, price: f64) {
        self.prices.push_back(price);

        while self.prices.len() > self.capacity {
            self.prices.pop_front();
        }
    }

    pub fn latest(&self) -> Option<f64> {
        self.prices.back().copied()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Prices oldest-first
    pub fn to_vec(&self) -> Vec<f64> {
        self.prices.iter().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.prices.iter()
    }
}

/// In-memory store of recent prices per symbol
///
/// Maintains a rolling window of prices for each symbol, created lazily
/// on the first observation.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    data: HashMap<String, RollingWindow>,
    max_prices: usize,
}

impl PriceHistory {
    /// Create a new price history store
    ///
    /// # Arguments
    /// * `max_prices` - Maximum number of prices to keep per symbol
    pub fn new(max_prices: usize) -> Self {
        Self {
            data: HashMap::new(),
            max_prices,
        }
    }

    /// Record a price for a symbol
    ///
    /// If the window is full, removes the oldest price
    pub fn append(&mut self, symbol: &str, price: f64) {
        let max_prices = self.max_prices;
        self.data
            .entry(symbol.to_string())
            .or_insert_with(|| RollingWindow::new(max_prices))
            .push(price);
    }

    /// Most recent price for a symbol, `None` when nothing was recorded yet
    pub fn latest(&self, symbol: &str) -> Option<f64> {
        self.data.get(symbol).and_then(RollingWindow::latest)
    }

    /// All prices for a symbol, oldest first
    pub fn series(&self, symbol: &str) -> Vec<f64> {
        self.data
            .get(symbol)
            .map(RollingWindow::to_vec)
            .unwrap_or_default()
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.data.get(symbol).map(RollingWindow::len).unwrap_or(0)
    }

    pub fn max_prices(&self) -> usize {
        self.max_prices
    }

    /// Symbols with at least one recorded price
    pub fn symbols(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_store() {
        let history = PriceHistory::new(100);
        assert_eq!(history.max_prices(), 100);
        assert!(history.symbols().is_empty());
    }

    #[test]
    fn test_latest_without_data() {
        let history = PriceHistory::new(100);
        assert_eq!(history.latest("XAUUSD"), None);
        assert!(history.series("XAUUSD").is_empty());
    }

    #[test]
    fn test_append_and_series() {
        let mut history = PriceHistory::new(100);

        history.append("BTC/USDT", 100.0);
        history.append("BTC/USDT", 101.0);
        history.append("BTC/USDT", 102.0);

        let series = history.series("BTC/USDT");
        assert_eq!(series, vec![100.0, 101.0, 102.0]);
        assert_eq!(history.latest("BTC/USDT"), Some(102.0));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut history = PriceHistory::new(5);

        for i in 0..10 {
            history.append("BTC/USDT", 100.0 + i as f64);
        }

        let series = history.series("BTC/USDT");
        assert_eq!(series.len(), 5); // Should only keep last 5
        assert_eq!(series, vec![105.0, 106.0, 107.0, 108.0, 109.0]);
    }

    #[test]
    fn test_fifo_law_at_every_step() {
        let mut history = PriceHistory::new(3);
        let mut expected: VecDeque<f64> = VecDeque::new();

        for i in 0..20 {
            let price = i as f64;
            history.append("XAUUSD", price);
            expected.push_back(price);
            if expected.len() > 3 {
                expected.pop_front();
            }

            assert!(history.len("XAUUSD") <= 3);
            assert_eq!(history.series("XAUUSD"), Vec::from(expected.clone()));
        }
    }

    #[test]
    fn test_symbols_are_independent() {
        let mut history = PriceHistory::new(2);

        history.append("BTC/USDT", 100.0);
        history.append("XAUUSD", 2000.0);
        history.append("XAUUSD", 2001.0);
        history.append("XAUUSD", 2002.0);

        assert_eq!(history.series("BTC/USDT"), vec![100.0]);
        assert_eq!(history.series("XAUUSD"), vec![2001.0, 2002.0]);
        assert_eq!(history.symbols().len(), 2);
    }
}
