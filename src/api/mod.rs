// Broker collaborators: the only code that talks to the outside world
pub mod litefinance;
pub mod paper;

pub use litefinance::LiteFinanceClient;
pub use paper::PaperBroker;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::models::{AccountInfo, BrokerPosition, OrderConfirmation, OrderType, Side};

/// Price feed, account and order execution contract
///
/// The engine never performs network I/O itself; everything it needs
/// from an exchange goes through this trait.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Latest observation for a symbol
    async fn get_price(&self, symbol: &str) -> Result<f64>;

    async fn account_info(&self) -> Result<AccountInfo>;

    async fn create_order(
        &self,
        symbol: &str,
        order_type: OrderType,
        side: Side,
        size: f64,
    ) -> Result<OrderConfirmation>;

    /// Close by broker position id, or by symbol when no id is known
    async fn close_position(&self, position_id: Option<&str>, symbol: &str) -> Result<OrderConfirmation>;

    async fn open_positions(&self) -> Result<Vec<BrokerPosition>>;
}

#[async_trait]
impl<T: Broker + ?Sized> Broker for Arc<T> {
    async fn get_price(&self, symbol: &str) -> Result<f64> {
        (**self).get_price(symbol).await
    }

    async fn account_info(&self) -> Result<AccountInfo> {
        (**self).account_info().await
    }

    async fn create_order(
        &self,
        symbol: &str,
        order_type: OrderType,
        side: Side,
        size: f64,
    ) -> Result<OrderConfirmation> {
        (**self).create_order(symbol, order_type, side, size).await
    }

    async fn close_position(&self, position_id: Option<&str>, symbol: &str) -> Result<OrderConfirmation> {
        (**self).close_position(position_id, symbol).await
    }

    async fn open_positions(&self) -> Result<Vec<BrokerPosition>> {
        (**self).open_positions().await
    }
}
