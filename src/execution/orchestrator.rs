use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Duration};

use super::position_manager::{PositionAction, PositionDecision, PositionManager, ReconcileOutcome};
use super::price_history::PriceHistory;
use crate::api::Broker;
use crate::error::EngineError;
use crate::models::{AccountInfo, OrderType};
use crate::reporting::{ActionTaken, CycleReport, LogEntry, PositionView, ReportSink, Sentiment, SymbolReport};
use crate::risk::{DynamicRiskCalculator, VolatilityEstimator};
use crate::settings::{ConfigError, TradingConfig};
use crate::strategy::{SignalConfig, SignalGenerator, Strategy};

/// Cooperative stop signal shared between the engine and its controller
#[derive(Debug, Clone)]
pub struct StopHandle {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl StopHandle {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn stop(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once `stop` has been called on any clone
    pub async fn stopped(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Await a collaborator call, giving up after `limit`
async fn bounded<T>(
    limit: Duration,
    symbol: &str,
    operation: &'static str,
    call: impl Future<Output = anyhow::Result<T>>,
) -> Result<anyhow::Result<T>, EngineError> {
    timeout(limit, call).await.map_err(|_| EngineError::Timeout {
        symbol: symbol.to_string(),
        operation,
        timeout_ms: limit.as_millis() as u64,
    })
}

/// Drives the per-symbol decision pipeline once per cycle
///
/// fetch price -> history/volatility -> risk -> signal -> position decision
/// -> broker execution. A failure for one symbol is logged in the cycle
/// report and never stops the remaining symbols.
pub struct Orchestrator<B: Broker, S: Strategy = SignalGenerator> {
    config: TradingConfig,
    broker: B,
    strategy: S,
    history: PriceHistory,
    volatility: VolatilityEstimator,
    risk: DynamicRiskCalculator,
    positions: PositionManager,
    last_account: Option<AccountInfo>,
    pending_logs: Vec<LogEntry>,
    cycle: u64,
    stop: StopHandle,
}

impl<B: Broker> Orchestrator<B> {
    pub fn new(config: TradingConfig, broker: B) -> Result<Self, EngineError> {
        let strategy = SignalGenerator::new(SignalConfig::from(&config));
        Self::with_strategy(config, broker, strategy)
    }
}

impl<B: Broker, S: Strategy> Orchestrator<B, S> {
    pub fn with_strategy(config: TradingConfig, broker: B, strategy: S) -> Result<Self, EngineError> {
        config.validate()?;

        if config.history_capacity < strategy.min_samples_required() {
            return Err(ConfigError::Invalid {
                field: "history_capacity",
                reason: format!(
                    "{} cannot hold the {} prices {} needs",
                    config.history_capacity,
                    strategy.min_samples_required(),
                    strategy.name()
                ),
            }
            .into());
        }

        Ok(Self {
            history: PriceHistory::new(config.history_capacity),
            volatility: VolatilityEstimator::new(config.volatility_window),
            risk: DynamicRiskCalculator::new(&config),
            positions: PositionManager::new(
                config.confidence_threshold,
                config.take_profit_percentage,
                config.stop_loss_percentage,
            ),
            config,
            broker,
            strategy,
            last_account: None,
            pending_logs: Vec::new(),
            cycle: 0,
            stop: StopHandle::new(),
        })
    }

    pub fn config(&self) -> &TradingConfig {
        &self.config
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    pub fn history(&self) -> &PriceHistory {
        &self.history
    }

    /// Number of cycles started so far
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Align tracked positions with the broker's view; the broker wins
    pub async fn reconcile(&mut self) -> Result<ReconcileOutcome, EngineError> {
        let broker_positions = bounded(
            self.config.call_timeout(),
            "*",
            "open positions query",
            self.broker.open_positions(),
        )
        .await?
        .map_err(|source| EngineError::Fetch {
            symbol: "*".to_string(),
            what: "open positions",
            source,
        })?;

        let outcome = self.positions.reconcile(&broker_positions, Utc::now());

        for symbol in &outcome.adopted {
            self.pending_logs.push(LogEntry::warning(format!(
                "{}: tracking position reported by broker",
                symbol
            )));
        }
        for symbol in &outcome.dropped {
            self.pending_logs.push(LogEntry::warning(format!(
                "{}: broker no longer reports position, dropped",
                symbol
            )));
        }

        Ok(outcome)
    }

    /// Run one full pass over the configured symbols
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycle += 1;
        tracing::debug!(cycle = self.cycle, "Starting cycle");

        let every = self.config.reconcile_every_cycles;
        if every > 0 && self.cycle % every == 0 {
            if let Err(e) = self.reconcile().await {
                self.pending_logs
                    .push(LogEntry::warning(format!("Reconciliation skipped: {}", e)));
            }
        }

        let mut logs = std::mem::take(&mut self.pending_logs);
        let account = self.refresh_account(&mut logs).await;
        let balance = account.as_ref().map(|a| a.balance).unwrap_or(0.0);

        let symbols = self.config.trading_pairs.clone();
        let mut reports = Vec::with_capacity(symbols.len());

        for symbol in &symbols {
            if self.stop.is_stopped() {
                logs.push(LogEntry::warning("Stop requested, ending cycle early"));
                break;
            }

            match self.process_symbol(symbol, balance, &mut logs).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::debug!(symbol = %symbol, error = ?e, "Symbol skipped this cycle");
                    logs.push(LogEntry::error(e.to_string()));
                }
            }
        }

        let positions = self
            .positions
            .open_positions()
            .into_iter()
            .map(|p| {
                let mark = self.history.latest(&p.symbol).unwrap_or(p.entry_price);
                PositionView::new(p, mark)
            })
            .collect();

        let now = Utc::now();
        CycleReport {
            cycle: self.cycle,
            timestamp: now,
            account,
            sentiment: Sentiment::from_directions(reports.iter().map(|r| &r.signal.direction)),
            symbols: reports,
            positions,
            stats: self.positions.stats(now.date_naive()),
            logs,
        }
    }

    /// Cycle until stopped or `max_cycles` have completed
    ///
    /// Returns the number of completed cycles.
    pub async fn run(&mut self, sink: &dyn ReportSink, max_cycles: Option<u64>) -> u64 {
        match self.reconcile().await {
            Ok(outcome) => tracing::info!(
                adopted = outcome.adopted.len(),
                dropped = outcome.dropped.len(),
                "Reconciled with broker"
            ),
            Err(e) => self
                .pending_logs
                .push(LogEntry::warning(format!("Startup reconciliation failed: {}", e))),
        }

        let interval = self.config.cycle_interval();
        let mut completed = 0;

        while !self.stop.is_stopped() {
            let report = self.run_cycle().await;
            sink.publish(&report);
            completed += 1;

            if max_cycles.is_some_and(|limit| completed >= limit) {
                break;
            }

            tokio::select! {
                _ = self.stop.stopped() => break,
                _ = sleep(interval) => {}
            }
        }

        tracing::info!(cycles = completed, "Engine stopped");
        completed
    }

    async fn refresh_account(&mut self, logs: &mut Vec<LogEntry>) -> Option<AccountInfo> {
        let result = bounded(
            self.config.call_timeout(),
            "*",
            "account info",
            self.broker.account_info(),
        )
        .await
        .and_then(|inner| {
            inner.map_err(|source| EngineError::Fetch {
                symbol: "*".to_string(),
                what: "account info",
                source,
            })
        });

        match result {
            Ok(account) => {
                self.last_account = Some(account.clone());
                Some(account)
            }
            Err(e) => {
                let fallback = if self.last_account.is_some() {
                    "using last known balance"
                } else {
                    "no balance known, entries skipped"
                };
                logs.push(LogEntry::warning(format!("{} ({})", e, fallback)));
                self.last_account.clone()
            }
        }
    }

    async fn process_symbol(
        &mut self,
        symbol: &str,
        balance: f64,
        logs: &mut Vec<LogEntry>,
    ) -> Result<SymbolReport, EngineError> {
        let price = bounded(
            self.config.call_timeout(),
            symbol,
            "price fetch",
            self.broker.get_price(symbol),
        )
        .await?
        .map_err(|source| EngineError::Fetch {
            symbol: symbol.to_string(),
            what: "price",
            source,
        })?;

        if !price.is_finite() || price <= 0.0 {
            return Err(EngineError::InvalidPrice {
                symbol: symbol.to_string(),
                price,
            });
        }

        self.history.append(symbol, price);
        let volatility = self.volatility.update(symbol, price);
        let risk = self.risk.compute(price, volatility, balance);
        let risk_level = self.risk.risk_level(risk.risk_percentage);
        let signal = self.strategy.analyze(&self.history.series(symbol));

        let decision = self.positions.decide(symbol, &signal, &risk, price);
        let action = self.execute(decision, logs).await?;

        Ok(SymbolReport {
            symbol: symbol.to_string(),
            price,
            volatility,
            risk,
            risk_level,
            signal,
            action,
        })
    }

    /// Hand a decision to the broker and commit it once confirmed
    async fn execute(
        &mut self,
        decision: PositionDecision,
        logs: &mut Vec<LogEntry>,
    ) -> Result<ActionTaken, EngineError> {
        let symbol = decision.symbol.as_str();
        let limit = self.config.call_timeout();

        match decision.action {
            PositionAction::Hold => {
                logs.push(LogEntry::info(format!("{}: {}", symbol, decision.reason)));
                Ok(ActionTaken::Hold)
            }
            PositionAction::Open(order) => {
                let result = bounded(
                    limit,
                    symbol,
                    "order",
                    self.broker
                        .create_order(symbol, OrderType::Market, order.side, order.size),
                )
                .await
                .and_then(|inner| {
                    inner.map_err(|source| EngineError::Execution {
                        symbol: symbol.to_string(),
                        source,
                    })
                });

                let confirmation = match result {
                    Ok(confirmation) => confirmation,
                    Err(e) => {
                        logs.push(LogEntry::error(format!("{} ({})", e, decision.reason)));
                        return Ok(ActionTaken::Failed);
                    }
                };

                self.positions.confirm_open(
                    symbol,
                    &order,
                    Some(confirmation.id),
                    confirmation.timestamp,
                )?;

                logs.push(LogEntry::success(format!(
                    "{}: opened {} {:.6} @ {:.4}, stop {:.4} ({})",
                    symbol,
                    order.side,
                    order.size,
                    order.entry_price,
                    order.stop_loss_price,
                    decision.reason
                )));
                Ok(ActionTaken::Opened {
                    side: order.side,
                    entry_price: order.entry_price,
                    size: order.size,
                })
            }
            PositionAction::Close {
                broker_id,
                exit_price,
                pnl_percentage,
                reason,
                ..
            } => {
                let result = bounded(
                    limit,
                    symbol,
                    "close",
                    self.broker.close_position(broker_id.as_deref(), symbol),
                )
                .await
                .and_then(|inner| {
                    inner.map_err(|source| EngineError::Execution {
                        symbol: symbol.to_string(),
                        source,
                    })
                });

                let confirmation = match result {
                    Ok(confirmation) => confirmation,
                    Err(e) => {
                        logs.push(LogEntry::error(format!("{} ({})", e, decision.reason)));
                        return Ok(ActionTaken::Failed);
                    }
                };

                let trade = self
                    .positions
                    .confirm_close(symbol, exit_price, reason, confirmation.timestamp)?;

                let message = format!("{}: closed, {}", symbol, decision.reason);
                logs.push(if trade.pnl_percentage > 0.0 {
                    LogEntry::success(message)
                } else {
                    LogEntry::warning(message)
                });
                Ok(ActionTaken::Closed {
                    exit_price,
                    pnl_percentage,
                    reason,
                })
            }
        }
    }
}
