// Per-cycle reporting surface
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::execution::{ExitReason, Position, TradingStats};
use crate::models::{AccountInfo, Side, SignalDirection};
use crate::risk::RiskParameters;
use crate::strategy::SignalResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Success,
    Warning,
    Error,
}

/// One human-readable line from a cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: LogSeverity,
    pub message: String,
}

impl LogEntry {
    pub fn new(severity: LogSeverity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogSeverity::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogSeverity::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogSeverity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogSeverity::Error, message)
    }
}

/// What the engine did for a symbol this cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionTaken {
    Hold,
    Opened {
        side: Side,
        entry_price: f64,
        size: f64,
    },
    Closed {
        exit_price: f64,
        pnl_percentage: f64,
        reason: ExitReason,
    },
    /// The broker rejected or failed to confirm the order
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolReport {
    pub symbol: String,
    pub price: f64,
    pub volatility: f64,
    pub risk: RiskParameters,
    /// 0-100 gauge of where the risk percentage sits between base and max
    pub risk_level: f64,
    pub signal: SignalResult,
    pub action: ActionTaken,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionView {
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub pnl_percentage: f64,
}

impl PositionView {
    pub fn new(position: &Position, current_price: f64) -> Self {
        Self {
            symbol: position.symbol.clone(),
            side: position.side,
            entry_price: position.entry_price,
            pnl_percentage: position.pnl_percentage(current_price),
        }
    }
}

/// Share of BUY vs SELL signals across the symbols evaluated in a cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Sentiment {
    pub bullish: f64,
    pub bearish: f64,
}

impl Sentiment {
    pub fn from_directions<'a>(directions: impl IntoIterator<Item = &'a SignalDirection>) -> Self {
        let (buys, sells) = directions
            .into_iter()
            .fold((0usize, 0usize), |(buys, sells), direction| match direction {
                SignalDirection::Buy => (buys + 1, sells),
                SignalDirection::Sell => (buys, sells + 1),
                SignalDirection::Neutral => (buys, sells),
            });

        let total = buys + sells;
        if total == 0 {
            return Self::default();
        }

        Self {
            bullish: buys as f64 / total as f64 * 100.0,
            bearish: sells as f64 / total as f64 * 100.0,
        }
    }
}

/// Everything observed and decided in one cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub timestamp: DateTime<Utc>,
    pub account: Option<AccountInfo>,
    /// Successfully evaluated symbols, in configuration order
    pub symbols: Vec<SymbolReport>,
    pub positions: Vec<PositionView>,
    pub stats: TradingStats,
    pub sentiment: Sentiment,
    pub logs: Vec<LogEntry>,
}

impl CycleReport {
    pub fn symbol(&self, symbol: &str) -> Option<&SymbolReport> {
        self.symbols.iter().find(|r| r.symbol == symbol)
    }

    pub fn has_errors(&self) -> bool {
        self.logs.iter().any(|l| l.severity == LogSeverity::Error)
    }
}

/// Consumer of cycle reports (dashboard, log, test collector)
pub trait ReportSink: Send + Sync {
    fn publish(&self, report: &CycleReport);
}

/// Renders reports through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn publish(&self, report: &CycleReport) {
        for entry in &report.logs {
            match entry.severity {
                LogSeverity::Info | LogSeverity::Success => tracing::info!("{}", entry.message),
                LogSeverity::Warning => tracing::warn!("{}", entry.message),
                LogSeverity::Error => tracing::error!("{}", entry.message),
            }
        }

        for symbol in &report.symbols {
            tracing::debug!(
                symbol = %symbol.symbol,
                price = symbol.price,
                volatility = symbol.volatility,
                risk_percentage = symbol.risk.risk_percentage,
                risk_level = symbol.risk_level,
                direction = ?symbol.signal.direction,
                confidence = symbol.signal.confidence,
                "Symbol evaluated"
            );
        }

        if let Some(account) = &report.account {
            tracing::info!(
                cycle = report.cycle,
                balance = account.balance,
                equity = account.equity,
                open_positions = report.positions.len(),
                total_trades = report.stats.total_trades,
                win_rate = report.stats.win_rate,
                bullish = report.sentiment.bullish,
                "Cycle complete"
            );
        } else {
            tracing::info!(
                cycle = report.cycle,
                open_positions = report.positions.len(),
                total_trades = report.stats.total_trades,
                "Cycle complete (no account info)"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentiment_shares() {
        let directions = [
            SignalDirection::Buy,
            SignalDirection::Buy,
            SignalDirection::Sell,
            SignalDirection::Neutral,
        ];
        let sentiment = Sentiment::from_directions(&directions);

        assert!((sentiment.bullish - 66.666_666).abs() < 1e-3);
        assert!((sentiment.bearish - 33.333_333).abs() < 1e-3);
    }

    #[test]
    fn test_sentiment_all_neutral() {
        let sentiment = Sentiment::from_directions(&[SignalDirection::Neutral]);
        assert_eq!(sentiment, Sentiment::default());
    }

    #[test]
    fn test_log_severity_serializes_lowercase() {
        let entry = LogEntry::warning("careful");
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["severity"], "warning");
        assert_eq!(json["message"], "careful");
    }

    #[test]
    fn test_report_has_errors() {
        let mut report = CycleReport {
            cycle: 1,
            timestamp: Utc::now(),
            account: None,
            symbols: Vec::new(),
            positions: Vec::new(),
            stats: TradingStats::default(),
            sentiment: Sentiment::default(),
            logs: vec![LogEntry::info("start")],
        };
        assert!(!report.has_errors());

        report.logs.push(LogEntry::error("boom"));
        assert!(report.has_errors());
    }
}
