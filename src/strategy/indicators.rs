//! Technical indicators over full price series
//!
//! Every function returns one value per input bar, `None` during warm-up.

/// Relative Strength Index (Wilder smoothing, seeded with a simple average)
pub fn rsi(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; prices.len()];
    if period == 0 || prices.len() < period + 1 {
        return out;
    }

    let changes: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let gain = |c: f64| c.max(0.0);
    let loss = |c: f64| (-c).max(0.0);

    let mut avg_gain = changes[..period].iter().map(|&c| gain(c)).sum::<f64>() / period as f64;
    let mut avg_loss = changes[..period].iter().map(|&c| loss(c)).sum::<f64>() / period as f64;
    out[period] = Some(rsi_value(avg_gain, avg_loss));

    for (i, &c) in changes.iter().enumerate().skip(period) {
        avg_gain = (avg_gain * (period - 1) as f64 + gain(c)) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss(c)) / period as f64;
        out[i + 1] = Some(rsi_value(avg_gain, avg_loss));
    }

    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return if avg_gain == 0.0 { 50.0 } else { 100.0 };
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// Highest value of the `period` bars ending at each bar (inclusive)
pub fn highest(values: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling(values, period, f64::max)
}

/// Lowest value of the `period` bars ending at each bar (inclusive)
pub fn lowest(values: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling(values, period, f64::min)
}

fn rolling(values: &[f64], period: usize, pick: fn(f64, f64) -> f64) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                None
            } else {
                values[i + 1 - period..=i].iter().copied().reduce(pick)
            }
        })
        .collect()
}

/// Donchian channel from the previous `lookback` bars, excluding the current one,
/// so a close can break out of it. Returns (lower, upper) per bar.
pub fn donchian_channel(
    highs: &[f64],
    lows: &[f64],
    lookback: usize,
) -> Vec<Option<(f64, f64)>> {
    let upper = highest(highs, lookback);
    let lower = lowest(lows, lookback);

    (0..highs.len())
        .map(|i| {
            if i == 0 {
                return None;
            }
            match (lower[i - 1], upper[i - 1]) {
                (Some(lo), Some(hi)) => Some((lo, hi)),
                _ => None,
            }
        })
        .collect()
}
