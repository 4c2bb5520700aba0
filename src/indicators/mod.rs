// Technical indicators module
// Implements SMA, EMA, RSI and MACD over plain price series

pub mod macd;
pub mod moving_average;
pub mod rsi;

pub use macd::{calculate_macd, MacdSeries};
pub use moving_average::{calculate_ema, calculate_ema_series, calculate_sma};
pub use rsi::{calculate_rsi, calculate_rsi_series};
