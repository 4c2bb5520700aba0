use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::Broker;
use crate::models::{AccountInfo, BrokerPosition, OrderConfirmation, OrderType, Side};

const DEFAULT_START_PRICE: f64 = 100.0;
const DEFAULT_STEP: f64 = 0.002;

#[derive(Debug, Clone)]
struct PaperPosition {
    id: String,
    symbol: String,
    side: Side,
    entry_price: f64,
    amount: f64,
}

impl PaperPosition {
    fn unrealized(&self, price: f64) -> f64 {
        match self.side {
            Side::Buy => (price - self.entry_price) * self.amount,
            Side::Sell => (self.entry_price - price) * self.amount,
        }
    }
}

struct PaperState {
    rng: StdRng,
    prices: HashMap<String, f64>,
    positions: Vec<PaperPosition>,
    balance: f64,
    daily_pnl: f64,
    pnl_day: NaiveDate,
    next_id: u64,
}

impl PaperState {
    fn mark(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).copied()
    }

    fn roll_day(&mut self) {
        let today = Utc::now().date_naive();
        if today != self.pnl_day {
            self.pnl_day = today;
            self.daily_pnl = 0.0;
        }
    }
}

/// Simulated broker: seeded random-walk prices and instant fills
///
/// Every `get_price` call advances the symbol's walk by one step, so a
/// given seed and call order always produce the same series.
pub struct PaperBroker {
    state: Mutex<PaperState>,
    start_prices: HashMap<String, f64>,
    step: f64,
}

impl PaperBroker {
    pub fn new(seed: u64, initial_balance: f64) -> Self {
        Self {
            state: Mutex::new(PaperState {
                rng: StdRng::seed_from_u64(seed),
                prices: HashMap::new(),
                positions: Vec::new(),
                balance: initial_balance,
                daily_pnl: 0.0,
                pnl_day: Utc::now().date_naive(),
                next_id: 1,
            }),
            start_prices: HashMap::new(),
            step: DEFAULT_STEP,
        }
    }

    /// First price quoted for `symbol` (defaults to 100)
    pub fn with_start_price(mut self, symbol: &str, price: f64) -> Self {
        self.start_prices.insert(symbol.to_string(), price);
        self
    }

    /// Maximum relative move per step
    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    fn start_price(&self, symbol: &str) -> f64 {
        self.start_prices
            .get(symbol)
            .copied()
            .unwrap_or(DEFAULT_START_PRICE)
    }
}

#[async_trait]
impl Broker for PaperBroker {
    async fn get_price(&self, symbol: &str) -> Result<f64> {
        let mut state = self.state.lock().await;

        let price = match state.mark(symbol) {
            Some(last) => {
                let change = state.rng.gen_range(-self.step..=self.step);
                last * (1.0 + change)
            }
            None => self.start_price(symbol),
        };

        state.prices.insert(symbol.to_string(), price);
        Ok(price)
    }

    async fn account_info(&self) -> Result<AccountInfo> {
        let mut state = self.state.lock().await;
        state.roll_day();

        let unrealized: f64 = state
            .positions
            .iter()
            .map(|p| p.unrealized(state.mark(&p.symbol).unwrap_or(p.entry_price)))
            .sum();

        Ok(AccountInfo {
            balance: state.balance,
            equity: state.balance + unrealized,
            open_positions: state.positions.len(),
            daily_pnl: state.daily_pnl,
        })
    }

    async fn create_order(
        &self,
        symbol: &str,
        _order_type: OrderType,
        side: Side,
        size: f64,
    ) -> Result<OrderConfirmation> {
        if !size.is_finite() || size <= 0.0 {
            bail!("Rejected order for {}: invalid size {}", symbol, size);
        }

        let mut state = self.state.lock().await;
        let fill_price = state
            .mark(symbol)
            .with_context(|| format!("No quote for {} yet", symbol))?;

        let id = format!("paper-{}", state.next_id);
        state.next_id += 1;
        state.positions.push(PaperPosition {
            id: id.clone(),
            symbol: symbol.to_string(),
            side,
            entry_price: fill_price,
            amount: size,
        });

        tracing::debug!(symbol, side = %side, size, fill_price, "Paper order filled");

        Ok(OrderConfirmation {
            id,
            fill_price: Some(fill_price),
            timestamp: Utc::now(),
        })
    }

    async fn close_position(&self, position_id: Option<&str>, symbol: &str) -> Result<OrderConfirmation> {
        let mut state = self.state.lock().await;
        state.roll_day();

        let index = state
            .positions
            .iter()
            .position(|p| match position_id {
                Some(id) => p.id == id,
                None => p.symbol == symbol,
            })
            .with_context(|| format!("No open paper position for {}", symbol))?;

        let position = state.positions.remove(index);
        let fill_price = state.mark(&position.symbol).unwrap_or(position.entry_price);
        let realized = position.unrealized(fill_price);
        state.balance += realized;
        state.daily_pnl += realized;

        tracing::debug!(symbol, fill_price, realized, "Paper position closed");

        Ok(OrderConfirmation {
            id: position.id,
            fill_price: Some(fill_price),
            timestamp: Utc::now(),
        })
    }

    async fn open_positions(&self) -> Result<Vec<BrokerPosition>> {
        let state = self.state.lock().await;

        Ok(state
            .positions
            .iter()
            .map(|p| BrokerPosition {
                id: p.id.clone(),
                symbol: p.symbol.clone(),
                side: p.side,
                entry_price: p.entry_price,
                amount: Some(p.amount),
            })
            .collect())
    }
}
