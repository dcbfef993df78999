//! Backtest engine for running a strategy over an OHLC table

use super::metrics::PerformanceSummary;
use crate::data::OhlcTable;
use crate::strategy::{strategy_returns, SignalResult, Strategy};
use tracing::{debug, info};

/// Result of a backtest run
#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub strategy: String,
    pub market: String,
    pub signals: SignalResult,
    /// Per-bar log returns, NaN on the final bar
    pub returns: Vec<f64>,
    pub summary: PerformanceSummary,
}

impl BacktestResult {
    /// Positions opened over the run, counting flips
    pub fn total_trades(&self) -> usize {
        self.signals.entries()
    }
}

pub struct BacktestEngine {
    periods_per_year: f64,
}

impl BacktestEngine {
    pub fn new(periods_per_year: f64) -> Self {
        Self { periods_per_year }
    }

    pub fn run(&self, strategy: &dyn Strategy, table: &OhlcTable) -> BacktestResult {
        info!(
            "Starting backtest: {} on {} ({} bars)",
            strategy.name(),
            table.name(),
            table.len()
        );

        let signals = strategy.generate_signals(table);
        let returns = strategy_returns(table, &signals);
        let summary = PerformanceSummary::from_returns(&returns, self.periods_per_year);

        debug!(
            "Positions: {:?}, changes: {:?}",
            signals.position_counts(),
            signals.change_counts()
        );

        let result = BacktestResult {
            strategy: strategy.name().to_string(),
            market: table.name().to_string(),
            signals,
            returns,
            summary,
        };

        info!(
            "Backtest complete: {} trades, {:.4} total log return, {:.2} Sharpe",
            result.total_trades(),
            result.summary.total_return,
            result.summary.sharpe_ratio
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Bar;
    use crate::strategy::{DonchianBreakoutStrategy, DonchianConfig};

    #[test]
    fn test_run_uptrend_breakout() {
        let bars = (0..40)
            .map(|i| {
                let c = 100.0 * 1.01f64.powi(i);
                Bar::new(c / 1.01, c * 1.001, c / 1.011, c)
            })
            .collect();
        let table = OhlcTable::new("up", bars).unwrap();

        let strategy = DonchianBreakoutStrategy::new(DonchianConfig {
            lookback: 5,
            long_only: false,
        });
        let result = BacktestEngine::new(252.0).run(&strategy, &table);

        assert_eq!(result.returns.len(), 40);
        assert_eq!(result.total_trades(), 1);
        assert!(result.summary.total_return > 0.0);
        assert_eq!(result.summary.max_drawdown, 0.0);
    }
}
