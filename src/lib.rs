// Core modules
pub mod api;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod reporting;
pub mod risk;
pub mod settings;
pub mod strategy;

// Re-export commonly used types
pub use api::Broker;
pub use error::EngineError;
pub use execution::{Orchestrator, StopHandle};
pub use models::*;
pub use settings::TradingConfig;
pub use strategy::Strategy;
