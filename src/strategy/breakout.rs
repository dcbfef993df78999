//! Donchian Breakout Strategy
//!
//! Goes long when the close breaks above the highest high of the previous
//! `lookback` bars, short when it breaks below the lowest low. The position is held
//! until the opposite breakout.

use crate::data::OhlcTable;
use crate::strategy::base::Strategy;
use crate::strategy::indicators::donchian_channel;
use crate::strategy::signals::RawSignal;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for Donchian breakout strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DonchianConfig {
    pub lookback: usize,
    /// Breakdowns close longs instead of opening shorts
    pub long_only: bool,
}

impl Default for DonchianConfig {
    fn default() -> Self {
        Self {
            lookback: 20,
            long_only: false,
        }
    }
}

pub struct DonchianBreakoutStrategy {
    config: DonchianConfig,
}

impl DonchianBreakoutStrategy {
    pub fn new(config: DonchianConfig) -> Self {
        Self { config }
    }
}

impl Strategy for DonchianBreakoutStrategy {
    fn name(&self) -> &str {
        "Donchian"
    }

    fn long_only(&self) -> bool {
        self.config.long_only
    }

    fn raw_signals(&self, table: &OhlcTable) -> Vec<RawSignal> {
        let channel = donchian_channel(&table.highs(), &table.lows(), self.config.lookback);

        let signals: Vec<RawSignal> = table
            .bars()
            .iter()
            .zip(&channel)
            .map(|(bar, range)| match range {
                Some((_, upper)) if bar.close > *upper => RawSignal::Buy,
                Some((lower, _)) if bar.close < *lower => RawSignal::Sell,
                _ => RawSignal::Hold,
            })
            .collect();

        debug!(
            "{}: Donchian({}) {} breakouts / {} breakdowns",
            table.name(),
            self.config.lookback,
            signals.iter().filter(|s| **s == RawSignal::Buy).count(),
            signals.iter().filter(|s| **s == RawSignal::Sell).count()
        );

        signals
    }
}
