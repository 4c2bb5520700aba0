// Trading strategy module
pub mod signals;

pub use signals::{IndicatorValues, SignalConfig, SignalGenerator, SignalResult};

/// Base trait for signal producers driven by the orchestrator
pub trait Strategy: Send + Sync {
    /// Analyze a price series (oldest first) and produce a signal
    ///
    /// Short series yield `SignalResult::neutral()` rather than an error.
    fn analyze(&self, prices: &[f64]) -> SignalResult;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum prices required before indicators are computed
    fn min_samples_required(&self) -> usize;
}
