use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{BrokerPosition, Side};
use crate::risk::RiskParameters;
use crate::strategy::SignalResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
}

/// Open position tracked by the engine (at most one per symbol)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub id: Uuid,
    pub broker_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub stop_loss_price: f64,
    pub size: f64,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Unrealized P&L in percent, side-aware
    pub fn pnl_percentage(&self, current_price: f64) -> f64 {
        calculate_pnl_percentage(self.side, self.entry_price, current_price)
    }
}

/// `(current - entry) / entry * 100` for buys, inverted for sells
pub fn calculate_pnl_percentage(side: Side, entry_price: f64, current_price: f64) -> f64 {
    match side {
        Side::Buy => (current_price - entry_price) / entry_price * 100.0,
        Side::Sell => (entry_price - current_price) / entry_price * 100.0,
    }
}

/// Point a tracked position at the broker position it corresponds to
fn align_broker_id(position: &mut Position, reported: &[&BrokerPosition]) {
    let known = reported
        .iter()
        .any(|p| position.broker_id.as_deref() == Some(p.id.as_str()));
    if known {
        return;
    }

    let matching: Vec<&BrokerPosition> = reported
        .iter()
        .copied()
        .filter(|p| p.side == position.side)
        .collect();

    match matching.as_slice() {
        [only] => {
            if let Some(previous) = position.broker_id.replace(only.id.clone()) {
                tracing::info!(
                    symbol = %position.symbol,
                    previous = %previous,
                    broker_id = %only.id,
                    "Tracked position now follows broker position id"
                );
            }
        }
        _ => tracing::warn!(
            symbol = %position.symbol,
            candidates = matching.len(),
            "No single broker position matches the tracked one, keeping its id"
        ),
    }
}

/// A completed round trip, kept for the lifetime of the process
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub pnl_percentage: f64,
    pub reason: ExitReason,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

/// Aggregate performance over closed trades
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradingStats {
    pub total_trades: usize,
    /// Percentage of trades closed with positive P&L
    pub win_rate: f64,
    /// Sum of P&L percentages of trades closed today
    pub daily_pnl: f64,
    /// Best single trade P&L percentage
    pub best_trade: f64,
}

/// Entry the engine wants the broker to fill
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryOrder {
    pub side: Side,
    pub entry_price: f64,
    pub stop_loss_price: f64,
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PositionAction {
    Open(EntryOrder),
    Close {
        position_id: Uuid,
        broker_id: Option<String>,
        exit_price: f64,
        pnl_percentage: f64,
        reason: ExitReason,
    },
    Hold,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionDecision {
    pub symbol: String,
    pub action: PositionAction,
    pub reason: String,
}

/// Result of aligning engine state with broker-reported positions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    /// Symbols the broker holds that the engine now tracks
    pub adopted: Vec<String>,
    /// Symbols the engine tracked but the broker no longer holds
    pub dropped: Vec<String>,
}

/// Per-symbol FLAT/OPEN state machine
///
/// `decide` is pure; state only changes through `confirm_open` and
/// `confirm_close` once the broker has accepted the order.
pub struct PositionManager {
    positions: BTreeMap<String, Position>,
    trades: Vec<TradeRecord>,
    confidence_threshold: f64,
    take_profit_percentage: f64,
    stop_loss_percentage: f64,
}

impl PositionManager {
    pub fn new(
        confidence_threshold: f64,
        take_profit_percentage: f64,
        stop_loss_percentage: f64,
    ) -> Self {
        Self {
            positions: BTreeMap::new(),
            trades: Vec::new(),
            confidence_threshold,
            take_profit_percentage,
            stop_loss_percentage,
        }
    }

    /// Evaluate one symbol for this cycle
    ///
    /// OPEN symbols are checked for stop-loss first, then take-profit.
    /// FLAT symbols open on an actionable BUY/SELL signal.
    pub fn decide(
        &self,
        symbol: &str,
        signal: &SignalResult,
        risk: &RiskParameters,
        current_price: f64,
    ) -> PositionDecision {
        let decision = |action: PositionAction, reason: String| PositionDecision {
            symbol: symbol.to_string(),
            action,
            reason,
        };

        if let Some(position) = self.positions.get(symbol) {
            let pnl_percentage = position.pnl_percentage(current_price);
            let close = |reason: ExitReason| PositionAction::Close {
                position_id: position.id,
                broker_id: position.broker_id.clone(),
                exit_price: current_price,
                pnl_percentage,
                reason,
            };

            // Same comparison for both sides
            if current_price <= position.stop_loss_price {
                return decision(
                    close(ExitReason::StopLoss),
                    format!(
                        "Stop loss triggered at {:.4} (stop {:.4}, {:+.2}%)",
                        current_price, position.stop_loss_price, pnl_percentage
                    ),
                );
            }

            if pnl_percentage >= self.take_profit_percentage {
                return decision(
                    close(ExitReason::TakeProfit),
                    format!(
                        "Take profit reached at {:.4} ({:+.2}% >= {:.2}%)",
                        current_price, pnl_percentage, self.take_profit_percentage
                    ),
                );
            }

            return decision(
                PositionAction::Hold,
                format!(
                    "Holding {} position at {:+.2}%",
                    position.side, pnl_percentage
                ),
            );
        }

        if !signal.is_actionable(self.confidence_threshold) {
            return decision(
                PositionAction::Hold,
                format!(
                    "No entry: {:?} signal with confidence {:.2}",
                    signal.direction, signal.confidence
                ),
            );
        }

        let Some(side) = signal.direction.side() else {
            return decision(PositionAction::Hold, "Neutral signal".to_string());
        };

        // NaN sizes are rejected too
        if risk.max_position_size.is_nan() || risk.max_position_size <= 0.0 {
            return decision(
                PositionAction::Hold,
                format!("{} signal skipped: no capital available to size position", side),
            );
        }

        decision(
            PositionAction::Open(EntryOrder {
                side,
                entry_price: current_price,
                stop_loss_price: risk.stop_loss_price,
                size: risk.max_position_size,
            }),
            format!(
                "{} signal with confidence {:.2}",
                side.as_str().to_uppercase(),
                signal.confidence
            ),
        )
    }

    /// Record a position the broker has opened
    pub fn confirm_open(
        &mut self,
        symbol: &str,
        order: &EntryOrder,
        broker_id: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<Uuid, EngineError> {
        if self.positions.contains_key(symbol) {
            return Err(EngineError::InvariantViolation {
                symbol: symbol.to_string(),
                reason: "attempted to open a second position".to_string(),
            });
        }

        let id = Uuid::new_v4();
        self.positions.insert(
            symbol.to_string(),
            Position {
                id,
                broker_id,
                symbol: symbol.to_string(),
                side: order.side,
                entry_price: order.entry_price,
                stop_loss_price: order.stop_loss_price,
                size: order.size,
                opened_at: timestamp,
            },
        );

        Ok(id)
    }

    /// Record a position the broker has closed
    pub fn confirm_close(
        &mut self,
        symbol: &str,
        exit_price: f64,
        reason: ExitReason,
        timestamp: DateTime<Utc>,
    ) -> Result<TradeRecord, EngineError> {
        let position = self
            .positions
            .remove(symbol)
            .ok_or_else(|| EngineError::InvariantViolation {
                symbol: symbol.to_string(),
                reason: "attempted to close a flat symbol".to_string(),
            })?;

        let trade = TradeRecord {
            symbol: position.symbol.clone(),
            side: position.side,
            entry_price: position.entry_price,
            exit_price,
            size: position.size,
            pnl_percentage: position.pnl_percentage(exit_price),
            reason,
            opened_at: position.opened_at,
            closed_at: timestamp,
        };
        self.trades.push(trade.clone());

        Ok(trade)
    }

    /// Align tracked positions with what the broker reports
    ///
    /// The broker is authoritative: untracked broker positions are adopted
    /// with a stop-loss derived from their entry price, and tracked
    /// positions the broker no longer holds are dropped without a trade
    /// record. A tracked position takes the id of the single broker
    /// position with the same symbol and side, so later closes address
    /// the broker's position id rather than the order id.
    pub fn reconcile(
        &mut self,
        broker_positions: &[BrokerPosition],
        timestamp: DateTime<Utc>,
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        let reported_symbols: HashSet<&str> = broker_positions.iter().map(|p| p.symbol.as_str()).collect();

        let stale: Vec<String> = self
            .positions
            .keys()
            .filter(|symbol| !reported_symbols.contains(symbol.as_str()))
            .cloned()
            .collect();
        for symbol in stale {
            self.positions.remove(&symbol);
            tracing::warn!(symbol = %symbol, "Broker no longer reports position, dropping it");
            outcome.dropped.push(symbol);
        }

        let mut by_symbol: BTreeMap<&str, Vec<&BrokerPosition>> = BTreeMap::new();
        for broker_position in broker_positions {
            by_symbol
                .entry(broker_position.symbol.as_str())
                .or_default()
                .push(broker_position);
        }

        for (symbol, reported) in by_symbol {
            if let Some(position) = self.positions.get_mut(symbol) {
                align_broker_id(position, &reported);
                continue;
            }

            let broker_position = reported[0];
            if reported.len() > 1 {
                tracing::warn!(
                    symbol,
                    count = reported.len(),
                    "Broker reports several positions for one symbol, adopting the first"
                );
            }

            let stop_loss_price =
                broker_position.entry_price * (1.0 - self.stop_loss_percentage / 100.0);
            self.positions.insert(
                symbol.to_string(),
                Position {
                    id: Uuid::new_v4(),
                    broker_id: Some(broker_position.id.clone()),
                    symbol: symbol.to_string(),
                    side: broker_position.side,
                    entry_price: broker_position.entry_price,
                    stop_loss_price,
                    size: broker_position.amount.unwrap_or(0.0),
                    opened_at: timestamp,
                },
            );
            tracing::info!(
                symbol,
                side = %broker_position.side,
                entry_price = broker_position.entry_price,
                "Adopted broker position"
            );
            outcome.adopted.push(symbol.to_string());
        }

        outcome
    }

    pub fn has_open_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Open positions ordered by symbol
    pub fn open_positions(&self) -> Vec<&Position> {
        self.positions.values().collect()
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    /// Statistics over all closed trades, with daily P&L for `today` (UTC)
    pub fn stats(&self, today: NaiveDate) -> TradingStats {
        if self.trades.is_empty() {
            return TradingStats::default();
        }

        let total_trades = self.trades.len();
        let wins = self.trades.iter().filter(|t| t.pnl_percentage > 0.0).count();
        let daily_pnl = self
            .trades
            .iter()
            .filter(|t| t.closed_at.date_naive() == today)
            .map(|t| t.pnl_percentage)
            .sum();
        let best_trade = self
            .trades
            .iter()
            .map(|t| t.pnl_percentage)
            .fold(f64::NEG_INFINITY, f64::max);

        TradingStats {
            total_trades,
            win_rate: wins as f64 / total_trades as f64 * 100.0,
            daily_pnl,
            best_trade,
        }
    }
}
