use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: Option<DateTime<Utc>>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
}

impl Bar {
    pub fn new(open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp: None,
            open,
            high,
            low,
            close,
            volume: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    /// High is at or above both open and close, low at or below both.
    pub fn is_consistent(&self) -> bool {
        self.high >= self.open.max(self.close) && self.low <= self.open.min(self.close)
    }

    fn has_positive_prices(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .all(|p| p.is_finite() && *p > 0.0)
    }
}

/// An ordered, immutable sequence of bars for one market.
#[derive(Debug, Clone, PartialEq)]
pub struct OhlcTable {
    name: String,
    bars: Vec<Bar>,
}

impl OhlcTable {
    /// Build a table, checking length and timestamp ordering.
    ///
    /// Timestamps are optional, but if any bar has one then every bar must, and they
    /// must be strictly increasing (no duplicates). Price positivity is checked by the
    /// permutation encoder, where it matters.
    pub fn new(name: impl Into<String>, bars: Vec<Bar>) -> Result<Self> {
        let name = name.into();

        if bars.len() < 2 {
            return Err(Error::InvalidRange(format!(
                "table '{}' has {} bars, at least 2 are required",
                name,
                bars.len()
            )));
        }

        let stamped = bars.iter().filter(|b| b.timestamp.is_some()).count();
        if stamped != 0 && stamped != bars.len() {
            return Err(Error::InvalidParameter(format!(
                "table '{}' has timestamps on {} of {} bars",
                name,
                stamped,
                bars.len()
            )));
        }

        for (i, pair) in bars.windows(2).enumerate() {
            if let (Some(prev), Some(next)) = (pair[0].timestamp, pair[1].timestamp) {
                if next <= prev {
                    return Err(Error::InvalidParameter(format!(
                        "table '{}' timestamps not strictly increasing at bar {} ({} -> {})",
                        name,
                        i + 1,
                        prev,
                        next
                    )));
                }
            }
        }

        Ok(Self { name, bars })
    }

    /// Same name and schema, new bars. Used by the permutation engine, which preserves
    /// length and timestamps of an already validated table.
    pub(crate) fn with_bars(&self, bars: Vec<Bar>) -> Self {
        Self {
            name: self.name.clone(),
            bars,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn has_timestamps(&self) -> bool {
        self.bars[0].timestamp.is_some()
    }

    pub fn has_volume(&self) -> bool {
        self.bars.iter().any(|b| b.volume.is_some())
    }

    pub fn timestamps(&self) -> Vec<Option<DateTime<Utc>>> {
        self.bars.iter().map(|b| b.timestamp).collect()
    }

    pub fn opens(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.open).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Number of bars violating high >= max(open, close) or low <= min(open, close).
    pub fn inconsistent_bars(&self) -> usize {
        self.bars.iter().filter(|b| !b.is_consistent()).count()
    }

    /// Index of the first bar with a non-positive or non-finite price.
    pub fn first_invalid_price(&self) -> Option<usize> {
        self.bars.iter().position(|b| !b.has_positive_prices())
    }

    /// Next-bar log return of the close for every bar: ln(close[i+1]) - ln(close[i]).
    /// The final bar has no next bar and gets NaN.
    pub fn forward_log_returns(&self) -> Vec<f64> {
        let mut returns: Vec<f64> = self
            .bars
            .windows(2)
            .map(|w| w[1].close.ln() - w[0].close.ln())
            .collect();
        returns.push(f64::NAN);
        returns
    }
}

/// Several markets sharing one time index.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiMarketOhlc {
    tables: Vec<OhlcTable>,
}

impl MultiMarketOhlc {
    /// Fails fast unless every table has the same length and the same timestamps.
    pub fn new(tables: Vec<OhlcTable>) -> Result<Self> {
        let Some(first) = tables.first() else {
            return Err(Error::MismatchedMarkets("no markets supplied".to_string()));
        };

        let reference = first.timestamps();
        for table in tables.iter().skip(1) {
            if table.len() != first.len() {
                return Err(Error::MismatchedMarkets(format!(
                    "'{}' has {} bars but '{}' has {}",
                    table.name(),
                    table.len(),
                    first.name(),
                    first.len()
                )));
            }

            if let Some(i) = table
                .bars()
                .iter()
                .zip(&reference)
                .position(|(bar, ts)| bar.timestamp != *ts)
            {
                return Err(Error::MismatchedMarkets(format!(
                    "'{}' and '{}' disagree on the time index at bar {}",
                    table.name(),
                    first.name(),
                    i
                )));
            }
        }

        Ok(Self { tables })
    }

    pub fn single(table: OhlcTable) -> Self {
        Self {
            tables: vec![table],
        }
    }

    pub fn tables(&self) -> &[OhlcTable] {
        &self.tables
    }

    pub fn n_markets(&self) -> usize {
        self.tables.len()
    }

    /// Bars per market.
    pub fn n_bars(&self) -> usize {
        self.tables[0].len()
    }
}
