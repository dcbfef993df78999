//! Log-relative decomposition of OHLC bars
//!
//! Each bar after the anchor is split into a gap (its open relative to the previous
//! close) and an intrabar shape (high, low and close relative to its own open), all in
//! log space so the offsets are additive.

use crate::data::OhlcTable;
use crate::error::{Error, Result};

/// Log-space OHLC values of a single bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogBar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Per-market relative arrays, all of length `n_bars - start_index - 1`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RelativeBarSet {
    pub gap: Vec<f64>,
    pub high_rel: Vec<f64>,
    pub low_rel: Vec<f64>,
    pub close_rel: Vec<f64>,
}

impl RelativeBarSet {
    pub fn len(&self) -> usize {
        self.gap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gap.is_empty()
    }
}

/// Anchor bar plus the relatives of every bar after it.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedMarket {
    pub start_bar: LogBar,
    pub relatives: RelativeBarSet,
}

/// Encode `table` from `start_index` onwards.
///
/// Fails with `InvalidRange` unless `start_index < n_bars - 1` and every price is
/// finite and positive.
pub fn encode(table: &OhlcTable, start_index: usize) -> Result<EncodedMarket> {
    let n = table.len();
    if start_index + 1 >= n {
        return Err(Error::InvalidRange(format!(
            "start_index {} leaves no bars to permute in '{}' ({} bars)",
            start_index,
            table.name(),
            n
        )));
    }

    if let Some(i) = table.first_invalid_price() {
        return Err(Error::InvalidRange(format!(
            "'{}' bar {} has a non-positive or non-finite price",
            table.name(),
            i
        )));
    }

    let bars = table.bars();
    let anchor = &bars[start_index];
    let start_bar = LogBar {
        open: anchor.open.ln(),
        high: anchor.high.ln(),
        low: anchor.low.ln(),
        close: anchor.close.ln(),
    };

    let perm_n = n - start_index - 1;
    let mut relatives = RelativeBarSet {
        gap: Vec::with_capacity(perm_n),
        high_rel: Vec::with_capacity(perm_n),
        low_rel: Vec::with_capacity(perm_n),
        close_rel: Vec::with_capacity(perm_n),
    };

    let mut prior_close = start_bar.close;
    for bar in &bars[start_index + 1..] {
        let open = bar.open.ln();
        let close = bar.close.ln();
        relatives.gap.push(open - prior_close);
        relatives.high_rel.push(bar.high.ln() - open);
        relatives.low_rel.push(bar.low.ln() - open);
        relatives.close_rel.push(close - open);
        prior_close = close;
    }

    Ok(EncodedMarket {
        start_bar,
        relatives,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Bar;

    fn table() -> OhlcTable {
        OhlcTable::new(
            "t",
            vec![
                Bar::new(100.0, 101.0, 99.0, 100.0),
                Bar::new(100.0, 102.0, 98.0, 101.0),
                Bar::new(102.0, 103.0, 100.0, 100.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_encode_relatives() {
        let enc = encode(&table(), 0).unwrap();
        assert_eq!(enc.relatives.len(), 2);
        assert!((enc.start_bar.close - 100f64.ln()).abs() < 1e-12);

        // bar 2: open 102 after close 101
        assert!((enc.relatives.gap[1] - (102f64 / 101.0).ln()).abs() < 1e-12);
        assert!((enc.relatives.high_rel[1] - (103f64 / 102.0).ln()).abs() < 1e-12);
        assert!((enc.relatives.low_rel[1] - (100f64 / 102.0).ln()).abs() < 1e-12);
        assert!((enc.relatives.close_rel[1] - (100f64 / 102.0).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_encode_start_index_bounds() {
        assert!(encode(&table(), 1).is_ok());
        assert!(matches!(encode(&table(), 2), Err(Error::InvalidRange(_))));
        assert!(matches!(encode(&table(), 10), Err(Error::InvalidRange(_))));
    }

    #[test]
    fn test_encode_rejects_non_positive_prices() {
        let t = OhlcTable::new(
            "t",
            vec![
                Bar::new(100.0, 101.0, 99.0, 100.0),
                Bar::new(100.0, 101.0, 0.0, 100.0),
            ],
        )
        .unwrap();
        assert!(matches!(encode(&t, 0), Err(Error::InvalidRange(_))));
    }
}
