// Price collection, position lifecycle and the trading loop
pub mod orchestrator;
pub mod position_manager;
pub mod price_history;

pub use orchestrator::{Orchestrator, StopHandle};
pub use position_manager::{
    EntryOrder, ExitReason, Position, PositionAction, PositionDecision, PositionManager, ReconcileOutcome,
    TradeRecord, TradingStats,
};
pub use price_history::{PriceHistory, RollingWindow};
