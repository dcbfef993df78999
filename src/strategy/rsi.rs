//! RSI Strategy
//!
//! Long-only mean reversion on the Relative Strength Index.
//! Buys when RSI is oversold (< 20), exits when RSI is overbought (> 80).

use crate::data::OhlcTable;
use crate::strategy::base::Strategy;
use crate::strategy::indicators::rsi;
use crate::strategy::signals::RawSignal;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for RSI strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RsiConfig {
    pub period: usize,
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for RsiConfig {
    fn default() -> Self {
        Self {
            period: 14,
            oversold: 20.0,
            overbought: 80.0,
        }
    }
}

pub struct RsiStrategy {
    config: RsiConfig,
}

impl RsiStrategy {
    pub fn new(config: RsiConfig) -> Self {
        Self { config }
    }
}

impl Strategy for RsiStrategy {
    fn name(&self) -> &str {
        "RSI"
    }

    fn long_only(&self) -> bool {
        true
    }

    fn raw_signals(&self, table: &OhlcTable) -> Vec<RawSignal> {
        let values = rsi(&table.closes(), self.config.period);

        let signals: Vec<RawSignal> = values
            .iter()
            .map(|v| match v {
                Some(v) if *v < self.config.oversold => RawSignal::Buy,
                Some(v) if *v > self.config.overbought => RawSignal::Sell,
                _ => RawSignal::Hold,
            })
            .collect();

        debug!(
            "{}: RSI({}) {} oversold / {} overbought bars",
            table.name(),
            self.config.period,
            signals.iter().filter(|s| **s == RawSignal::Buy).count(),
            signals.iter().filter(|s| **s == RawSignal::Sell).count()
        );

        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Bar;
    use crate::strategy::signals::PositionState;

    fn table(closes: &[f64]) -> OhlcTable {
        let bars = closes.iter().map(|&c| Bar::new(c, c, c, c)).collect();
        OhlcTable::new("t", bars).unwrap()
    }

    #[test]
    fn test_buys_after_selloff_and_exits_after_rally() {
        // 20 bars down, then 30 bars up
        let mut closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        closes.extend((1..=30).map(|i| 81.0 + i as f64));
        let t = table(&closes);

        let strategy = RsiStrategy::new(RsiConfig::default());
        let signals = strategy.generate_signals(&t);

        assert_eq!(signals.positions[14], PositionState::Long);
        assert_eq!(signals.positions[49], PositionState::Neutral);
        assert!(!signals.positions.contains(&PositionState::Short));
    }

    #[test]
    fn test_warm_up_holds() {
        let t = table(&[100.0, 99.0, 98.0]);
        let strategy = RsiStrategy::new(RsiConfig::default());
        assert!(strategy.raw_signals(&t).iter().all(|s| *s == RawSignal::Hold));
    }
}
