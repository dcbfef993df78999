//! Bar permutation engine
//!
//! Shuffles the intrabar shapes and the gaps of every bar after `start_index` with two
//! independent permutations, then rebuilds a price path from the anchor bar. Markets
//! permuted together share both permutations, so cross-market alignment survives.

use super::encoder::{encode, EncodedMarket};
use crate::data::{Bar, MultiMarketOhlc, OhlcTable};
use crate::error::{Error, Result};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

/// The two index permutations applied in one draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermutationOrder {
    /// Source position of the (high, low, close) shape used at each output position
    pub shape: Vec<usize>,
    /// Source position of the gap used at each output position
    pub gap: Vec<usize>,
}

impl PermutationOrder {
    /// Shape permutation first, gap permutation second.
    pub fn draw<R: Rng + ?Sized>(perm_n: usize, rng: &mut R) -> Self {
        let mut shape: Vec<usize> = (0..perm_n).collect();
        shape.shuffle(rng);

        let mut gap: Vec<usize> = (0..perm_n).collect();
        gap.shuffle(rng);

        Self { shape, gap }
    }

    pub fn len(&self) -> usize {
        self.shape.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shape.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BarPermutationEngine {
    start_index: usize,
}

impl BarPermutationEngine {
    /// Bars `0..=start_index` are kept; everything after is synthetic.
    pub fn new(start_index: usize) -> Self {
        Self { start_index }
    }

    /// Permute one market.
    pub fn permute<R: Rng + ?Sized>(&self, table: &OhlcTable, rng: &mut R) -> Result<OhlcTable> {
        let encoded = encode(table, self.start_index)?;
        let order = self.draw_order(encoded.relatives.len(), rng)?;
        self.reconstruct(table, &encoded, &order)
    }

    /// Permute several markets with one shared pair of permutations.
    ///
    /// Every market is encoded (and so validated) before any randomness is drawn.
    pub fn permute_markets<R: Rng + ?Sized>(
        &self,
        markets: &MultiMarketOhlc,
        rng: &mut R,
    ) -> Result<MultiMarketOhlc> {
        let encoded = markets
            .tables()
            .iter()
            .map(|t| encode(t, self.start_index))
            .collect::<Result<Vec<_>>>()?;

        let perm_n = markets.n_bars() - self.start_index - 1;
        let order = self.draw_order(perm_n, rng)?;

        debug!(
            "Permuting {} market(s), {} bars from index {}",
            markets.n_markets(),
            perm_n,
            self.start_index + 1
        );

        let tables = markets
            .tables()
            .iter()
            .zip(&encoded)
            .map(|(table, enc)| self.reconstruct(table, enc, &order))
            .collect::<Result<Vec<_>>>()?;

        MultiMarketOhlc::new(tables)
    }

    /// Permute one market with a fresh ChaCha8 stream. `None` seeds from entropy.
    pub fn permute_seeded(&self, table: &OhlcTable, seed: Option<u64>) -> Result<OhlcTable> {
        let mut rng = seeded_rng(seed);
        self.permute(table, &mut rng)
    }

    pub fn permute_markets_seeded(
        &self,
        markets: &MultiMarketOhlc,
        seed: Option<u64>,
    ) -> Result<MultiMarketOhlc> {
        let mut rng = seeded_rng(seed);
        self.permute_markets(markets, &mut rng)
    }

    fn draw_order<R: Rng + ?Sized>(&self, perm_n: usize, rng: &mut R) -> Result<PermutationOrder> {
        if perm_n < 1 {
            return Err(Error::InvalidRange(format!(
                "nothing to permute after start_index {}",
                self.start_index
            )));
        }
        Ok(PermutationOrder::draw(perm_n, rng))
    }

    /// Rebuild a table from its encoding and a drawn order.
    ///
    /// The prefix is copied bit for bit. After it, each bar is built left to right in
    /// log space from the previous synthetic close. Timestamps stay at their position,
    /// volume moves with the shape.
    ///
    /// Fails with `InvalidRange` if `encoded` or `order` was not built for `source` at
    /// this engine's `start_index`.
    pub fn reconstruct(
        &self,
        source: &OhlcTable,
        encoded: &EncodedMarket,
        order: &PermutationOrder,
    ) -> Result<OhlcTable> {
        let src = source.bars();
        let first = self.start_index + 1;
        let rel = &encoded.relatives;
        let perm_n = rel.len();

        if src.len() != first + perm_n
            || order.shape.len() != perm_n
            || order.gap.len() != perm_n
        {
            return Err(Error::InvalidRange(format!(
                "order for {} bars does not fit '{}' ({} bars after index {})",
                order.len(),
                source.name(),
                src.len().saturating_sub(first),
                self.start_index
            )));
        }
        if order.shape.iter().chain(&order.gap).any(|&i| i >= perm_n) {
            return Err(Error::InvalidRange(format!(
                "order index out of range for {} permutable bars",
                perm_n
            )));
        }

        let mut bars: Vec<Bar> = Vec::with_capacity(src.len());
        bars.extend_from_slice(&src[..first]);

        let mut prior_close = encoded.start_bar.close;
        for (k, (&s, &g)) in order.shape.iter().zip(&order.gap).enumerate() {
            let open = prior_close + rel.gap[g];
            let high = open + rel.high_rel[s];
            let low = open + rel.low_rel[s];
            let close = open + rel.close_rel[s];
            prior_close = close;

            bars.push(Bar {
                timestamp: src[first + k].timestamp,
                open: open.exp(),
                high: high.exp(),
                low: low.exp(),
                close: close.exp(),
                volume: src[first + s].volume,
            });
        }

        Ok(source.with_bars(bars))
    }
}

fn seeded_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::seed_from_u64(rand::random()),
    }
}
