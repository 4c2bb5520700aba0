// Risk management module
pub mod dynamic_risk;
pub mod volatility;

pub use dynamic_risk::{calculate_position_size, DynamicRiskCalculator, RiskParameters};
pub use volatility::{calculate_volatility, VolatilityEstimator};
