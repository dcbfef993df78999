//! Null-hypothesis trial generators

use super::monte_carlo::TrialGenerator;
use crate::data::{MultiMarketOhlc, OhlcTable};
use crate::error::{Error, Result};
use crate::permutation::{encode, BarPermutationEngine};
use crate::strategy::Strategy;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

/// Shuffles the realized strategy returns.
///
/// Cheaper than re-running the strategy but weaker: it ignores how the strategy would
/// have reacted to a different price path. Order-invariant metrics (total return,
/// Sharpe) cannot change under this generator.
#[derive(Debug, Clone)]
pub struct ReturnShuffleTrials {
    returns: Vec<f64>,
}

impl ReturnShuffleTrials {
    /// NaN entries (bars with no forward return) are dropped.
    pub fn new(returns: &[f64]) -> Self {
        Self {
            returns: returns.iter().copied().filter(|r| !r.is_nan()).collect(),
        }
    }
}

impl TrialGenerator for ReturnShuffleTrials {
    fn generate(&self, _trial: usize, rng: &mut ChaCha8Rng) -> Result<Vec<f64>> {
        let mut returns = self.returns.clone();
        returns.shuffle(rng);
        Ok(returns)
    }
}

/// Permutes the price data and re-runs the strategy on the synthetic path.
pub struct StrategyRerunTrials<'a> {
    strategy: &'a dyn Strategy,
    markets: MultiMarketOhlc,
    engine: BarPermutationEngine,
    traded_market: usize,
}

impl<'a> StrategyRerunTrials<'a> {
    /// `traded_market` picks which of the synchronized markets the strategy trades.
    ///
    /// Every market is validated here so that trials cannot fail later.
    pub fn new(
        strategy: &'a dyn Strategy,
        markets: MultiMarketOhlc,
        start_index: usize,
        traded_market: usize,
    ) -> Result<Self> {
        if traded_market >= markets.n_markets() {
            return Err(Error::InvalidParameter(format!(
                "traded market {} out of range for {} market(s)",
                traded_market,
                markets.n_markets()
            )));
        }

        for table in markets.tables() {
            encode(table, start_index)?;

            let inconsistent = table.inconsistent_bars();
            if inconsistent > 0 {
                warn!(
                    "{}: {} inconsistent source bars will be carried into every synthetic path",
                    table.name(),
                    inconsistent
                );
            }
        }

        info!(
            "Strategy re-run trials: {} on {} ({} market(s), {} bars, start_index {})",
            strategy.name(),
            markets.tables()[traded_market].name(),
            markets.n_markets(),
            markets.n_bars(),
            start_index
        );

        Ok(Self {
            strategy,
            markets,
            engine: BarPermutationEngine::new(start_index),
            traded_market,
        })
    }

    /// Single-market convenience
    pub fn single(strategy: &'a dyn Strategy, table: OhlcTable, start_index: usize) -> Result<Self> {
        Self::new(strategy, MultiMarketOhlc::single(table), start_index, 0)
    }

    /// Returns of the strategy on the unpermuted data
    pub fn actual_returns(&self) -> Vec<f64> {
        self.strategy.returns(&self.markets.tables()[self.traded_market])
    }
}

impl TrialGenerator for StrategyRerunTrials<'_> {
    fn generate(&self, _trial: usize, rng: &mut ChaCha8Rng) -> Result<Vec<f64>> {
        let permuted = self.engine.permute_markets(&self.markets, rng)?;
        Ok(self.strategy.returns(&permuted.tables()[self.traded_market]))
    }
}
