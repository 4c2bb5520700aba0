use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Instrument identifier (e.g. "BTC/USDT", "XAUUSD")
pub type Symbol = String;

/// Side of a trade or position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directional output of the signal generator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalDirection {
    Buy,
    Sell,
    Neutral,
}

impl SignalDirection {
    /// Side to trade for this direction, if any
    pub fn side(&self) -> Option<Side> {
        match self {
            SignalDirection::Buy => Some(Side::Buy),
            SignalDirection::Sell => Some(Side::Sell),
            SignalDirection::Neutral => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Uptrend,
    Downtrend,
}

/// Account snapshot reported by the broker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub balance: f64,
    pub equity: f64,
    #[serde(default)]
    pub open_positions: usize,
    #[serde(default, alias = "dailyPnL")]
    pub daily_pnl: f64,
}

/// Position as the broker sees it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BrokerPosition {
    pub id: String,
    pub symbol: Symbol,
    pub side: Side,
    pub entry_price: f64,
    #[serde(default)]
    pub amount: Option<f64>,
}

/// Broker acknowledgement of an order or close request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmation {
    pub id: String,
    #[serde(default, alias = "price")]
    pub fill_price: Option<f64>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Order type sent to the broker
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_side() {
        assert_eq!(SignalDirection::Buy.side(), Some(Side::Buy));
        assert_eq!(SignalDirection::Sell.side(), Some(Side::Sell));
        assert_eq!(SignalDirection::Neutral.side(), None);
    }

    #[test]
    fn test_broker_position_wire_format() {
        let json = r#"{"id":"p-1","symbol":"XAUUSD","side":"sell","entryPrice":2010.5}"#;
        let position: BrokerPosition = serde_json::from_str(json).unwrap();

        assert_eq!(position.side, Side::Sell);
        assert_eq!(position.entry_price, 2010.5);
    }

    #[test]
    fn test_account_info_defaults() {
        let json = r#"{"balance":10000.0,"equity":10250.0}"#;
        let account: AccountInfo = serde_json::from_str(json).unwrap();

        assert_eq!(account.open_positions, 0);
        assert_eq!(account.daily_pnl, 0.0);
    }
}
