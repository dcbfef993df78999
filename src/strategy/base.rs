//! Strategy interface

use super::signals::{strategy_returns, RawSignal, SignalManager, SignalResult};
use crate::data::OhlcTable;

/// A signal generator over a whole OHLC table.
///
/// Implementations are stateless so one instance can be shared across parallel trials.
pub trait Strategy: Send + Sync {
    /// Strategy display name
    fn name(&self) -> &str;

    /// Sell signals close longs instead of opening shorts
    fn long_only(&self) -> bool;

    /// One raw signal per bar
    fn raw_signals(&self, table: &OhlcTable) -> Vec<RawSignal>;

    /// Optional per-bar exit flags, applied before raw signals
    fn exit_conditions(&self, _table: &OhlcTable) -> Option<Vec<bool>> {
        None
    }

    /// Run the position state machine over this strategy's signals
    fn generate_signals(&self, table: &OhlcTable) -> SignalResult {
        let raw = self.raw_signals(table);
        let exits = self.exit_conditions(table);
        SignalManager::new(self.long_only()).generate(&raw, exits.as_deref())
    }

    /// Per-bar strategy log returns (final bar NaN)
    fn returns(&self, table: &OhlcTable) -> Vec<f64> {
        strategy_returns(table, &self.generate_signals(table))
    }
}
