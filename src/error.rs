use crate::settings::ConfigError;

/// Failures surfaced by the trading engine
///
/// Insufficient indicator data is not represented here: the signal
/// generator answers it with a neutral, zero-confidence signal.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to fetch {what} for {symbol}: {source}")]
    Fetch {
        symbol: String,
        what: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("{operation} for {symbol} timed out after {timeout_ms}ms")]
    Timeout {
        symbol: String,
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("order execution failed for {symbol}: {source}")]
    Execution {
        symbol: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid price {price} for {symbol}")]
    InvalidPrice { symbol: String, price: f64 },

    #[error("invariant violated for {symbol}: {reason}")]
    InvariantViolation { symbol: String, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// Symbol the failure is scoped to, if any
    pub fn symbol(&self) -> Option<&str> {
        match self {
            EngineError::Fetch { symbol, .. }
            | EngineError::Timeout { symbol, .. }
            | EngineError::Execution { symbol, .. }
            | EngineError::InvalidPrice { symbol, .. }
            | EngineError::InvariantViolation { symbol, .. } => Some(symbol),
            EngineError::Config(_) => None,
        }
    }
}
