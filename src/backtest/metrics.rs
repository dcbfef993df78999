//! Performance metrics calculated from per-bar strategy returns
//!
//! Returns are log returns. NaN entries (the final bar has no forward return) are
//! skipped by every calculation here.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default annualisation factor
pub const DEFAULT_PERIODS_PER_YEAR: f64 = 252.0;

/// Tail probability used for VaR / CVaR
pub const VAR_LEVEL: f64 = 0.05;

/// Which way a metric improves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Trials count as extreme when `trial >= actual`
    HigherIsBetter,
    /// Trials count as extreme when `trial <= actual`
    LowerIsWorse,
}

/// The scalar metrics a significance test can be run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Sharpe,
    ProfitFactor,
    TotalReturn,
    MaxDrawdown,
}

/// Available metric names
pub const METRIC_NAMES: &[&str] = &["sharpe", "profit_factor", "total_return", "max_drawdown"];

impl MetricKind {
    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::Sharpe => "sharpe",
            MetricKind::ProfitFactor => "profit_factor",
            MetricKind::TotalReturn => "total_return",
            MetricKind::MaxDrawdown => "max_drawdown",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            MetricKind::MaxDrawdown => Direction::LowerIsWorse,
            _ => Direction::HigherIsBetter,
        }
    }

    /// Evaluate this metric over a returns sequence.
    pub fn evaluate(&self, returns: &[f64], periods_per_year: f64) -> f64 {
        match self {
            MetricKind::Sharpe => sharpe_ratio(returns, periods_per_year),
            MetricKind::ProfitFactor => profit_factor(returns),
            MetricKind::TotalReturn => total_return(returns),
            MetricKind::MaxDrawdown => max_drawdown(returns),
        }
    }

    /// True when `trial` is at least as extreme as `actual`. Ties count as extreme.
    pub fn is_at_least_as_extreme(&self, trial: f64, actual: f64) -> bool {
        match self.direction() {
            Direction::HigherIsBetter => trial >= actual,
            Direction::LowerIsWorse => trial <= actual,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MetricKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sharpe" | "sharpe_ratio" => Ok(MetricKind::Sharpe),
            "profit_factor" | "pf" => Ok(MetricKind::ProfitFactor),
            "total_return" | "return" => Ok(MetricKind::TotalReturn),
            "max_drawdown" | "drawdown" | "mdd" => Ok(MetricKind::MaxDrawdown),
            _ => Err(Error::UndefinedMetric(s.to_string())),
        }
    }
}

fn finite(returns: &[f64]) -> impl Iterator<Item = f64> + '_ {
    returns.iter().copied().filter(|r| !r.is_nan())
}

/// Non-NaN values in ascending order. Reductions run over this so any reordering of
/// the same returns gives a bit-identical result.
fn sorted_finite(returns: &[f64]) -> Vec<f64> {
    let mut values: Vec<f64> = finite(returns).collect();
    values.sort_by(|a, b| a.total_cmp(b));
    values
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Annualised Sharpe ratio using the sample standard deviation.
/// Zero for fewer than two returns or zero variance.
pub fn sharpe_ratio(returns: &[f64], periods_per_year: f64) -> f64 {
    let values = sorted_finite(returns);
    if values.len() < 2 {
        return 0.0;
    }

    let mean = mean(&values);
    let variance =
        values.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    let std_dev = variance.sqrt();

    if std_dev == 0.0 || !std_dev.is_finite() {
        return 0.0;
    }

    (mean / std_dev) * periods_per_year.sqrt()
}

/// Annualised Sortino ratio; downside deviation over the losing bars only.
pub fn sortino_ratio(returns: &[f64], periods_per_year: f64) -> f64 {
    let values = sorted_finite(returns);
    if values.len() < 2 {
        return 0.0;
    }

    let mean = mean(&values);
    let downside: Vec<f64> = values.iter().copied().filter(|&r| r < 0.0).collect();

    if downside.is_empty() {
        return if mean > 0.0 { f64::INFINITY } else { 0.0 };
    }

    let downside_dev = (downside.iter().map(|r| r.powi(2)).sum::<f64>() / downside.len() as f64).sqrt();
    if downside_dev == 0.0 {
        return 0.0;
    }

    (mean / downside_dev) * periods_per_year.sqrt()
}

/// Gross gains over gross losses. +inf with gains and no losses, 0 with neither.
pub fn profit_factor(returns: &[f64]) -> f64 {
    let (gross_profit, gross_loss) =
        sorted_finite(returns)
            .into_iter()
            .fold((0.0, 0.0), |(p, l), r| if r > 0.0 { (p + r, l) } else { (p, l - r) });

    if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

/// Sum of log returns.
pub fn total_return(returns: &[f64]) -> f64 {
    sorted_finite(returns).iter().sum()
}

/// Most negative fractional decline of the compounded equity curve from its running
/// peak. The peak starts at the first compounded value, so a loss on the first bar
/// alone is not a drawdown. Always <= 0.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut equity = 1.0_f64;
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;

    for r in finite(returns) {
        equity *= 1.0 + r;
        peak = peak.max(equity);
        if peak > 0.0 {
            worst = worst.min((equity - peak) / peak);
        }
    }

    worst
}

/// Annualised return over absolute max drawdown, 0 without a drawdown.
pub fn calmar_ratio(returns: &[f64], periods_per_year: f64) -> f64 {
    let values = sorted_finite(returns);
    if values.is_empty() {
        return 0.0;
    }

    let annual_return = mean(&values) * periods_per_year;
    let max_dd = max_drawdown(returns).abs();
    if max_dd > 0.0 {
        annual_return / max_dd
    } else {
        0.0
    }
}

/// Linear-interpolated percentile, `q` in [0, 1].
pub fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = finite(values).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Value at Risk and Conditional VaR at the given tail probability
pub fn value_at_risk(returns: &[f64], level: f64) -> (f64, f64) {
    let values = sorted_finite(returns);
    if values.is_empty() {
        return (0.0, 0.0);
    }

    let var = percentile(&values, level);
    let tail: Vec<f64> = values.iter().copied().filter(|&r| r <= var).collect();
    (var, mean(&tail))
}

/// Full set of measures for one returns series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub periods: usize,
    pub active_bars: usize,
    pub win_rate: f64,
    pub total_return: f64,
    pub profit_factor: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub calmar_ratio: f64,
    pub var_5: f64,
    pub cvar_5: f64,
}

impl Default for PerformanceSummary {
    fn default() -> Self {
        Self {
            periods: 0,
            active_bars: 0,
            win_rate: 0.0,
            total_return: 0.0,
            profit_factor: 0.0,
            sharpe_ratio: 0.0,
            sortino_ratio: 0.0,
            max_drawdown: 0.0,
            calmar_ratio: 0.0,
            var_5: 0.0,
            cvar_5: 0.0,
        }
    }
}

impl PerformanceSummary {
    pub fn from_returns(returns: &[f64], periods_per_year: f64) -> Self {
        let values: Vec<f64> = finite(returns).collect();
        if values.is_empty() {
            return Self::default();
        }

        let active_bars = values.iter().filter(|&&r| r != 0.0).count();
        let wins = values.iter().filter(|&&r| r > 0.0).count();
        let win_rate = if active_bars > 0 {
            (wins as f64 / active_bars as f64) * 100.0
        } else {
            0.0
        };
        let (var_5, cvar_5) = value_at_risk(&values, VAR_LEVEL);

        Self {
            periods: values.len(),
            active_bars,
            win_rate,
            total_return: total_return(&values),
            profit_factor: profit_factor(&values),
            sharpe_ratio: sharpe_ratio(&values, periods_per_year),
            sortino_ratio: sortino_ratio(&values, periods_per_year),
            max_drawdown: max_drawdown(&values),
            calmar_ratio: calmar_ratio(&values, periods_per_year),
            var_5,
            cvar_5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_series_sharpe_is_zero() {
        assert_eq!(sharpe_ratio(&[0.0; 50], 252.0), 0.0);
        assert_eq!(sharpe_ratio(&[0.01; 50], 252.0), 0.0);
        assert_eq!(sharpe_ratio(&[0.01], 252.0), 0.0);
    }

    #[test]
    fn test_sharpe_uses_sample_std() {
        // mean 0.5, sample std sqrt(0.5)
        let s = sharpe_ratio(&[0.0, 1.0], 1.0);
        assert!((s - 0.5 / 0.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_nan_is_skipped() {
        let r = [0.01, -0.02, 0.03, f64::NAN];
        assert!((total_return(&r) - 0.02).abs() < 1e-12);
        assert!(sharpe_ratio(&r, 252.0).is_finite());
    }

    #[test]
    fn test_profit_factor_edges() {
        assert_eq!(profit_factor(&[0.5, -0.25]), 2.0);
        assert_eq!(profit_factor(&[0.1, 0.0, 0.2]), f64::INFINITY);
        assert_eq!(profit_factor(&[0.0, 0.0]), 0.0);
        assert_eq!(profit_factor(&[-0.1]), 0.0);
    }

    #[test]
    fn test_max_drawdown() {
        // equity 1.0 -> 1.5 -> 0.75 -> 0.9
        let dd = max_drawdown(&[0.5, -0.5, 0.2]);
        assert!((dd - (-0.5)).abs() < 1e-12);
        assert_eq!(max_drawdown(&[0.1, 0.2]), 0.0);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn test_drawdown_peak_starts_at_first_bar() {
        // equity 0.9 -> 0.945 never falls below its running max
        assert_eq!(max_drawdown(&[-0.1]), 0.0);
        assert_eq!(max_drawdown(&[-0.1, 0.05]), 0.0);
        // 0.9 -> 0.945 -> 0.8505
        let dd = max_drawdown(&[-0.1, 0.05, -0.1]);
        assert!((dd - (-0.1)).abs() < 1e-12);
    }

    #[test]
    fn test_reductions_ignore_order() {
        let forward: Vec<f64> = (1..=50).map(|i| 0.001 * i as f64 + 1e-7 * (i * i) as f64).collect();
        let mut mixed = forward.clone();
        mixed.reverse();
        mixed.swap(3, 41);
        mixed.swap(10, 27);

        assert_eq!(sharpe_ratio(&forward, 252.0), sharpe_ratio(&mixed, 252.0));
        assert_eq!(sortino_ratio(&forward, 252.0), sortino_ratio(&mixed, 252.0));
        assert_eq!(total_return(&forward), total_return(&mixed));

        let signed: Vec<f64> = forward
            .iter()
            .enumerate()
            .map(|(i, r)| if i % 3 == 0 { -r } else { *r })
            .collect();
        let mut signed_mixed = signed.clone();
        signed_mixed.reverse();
        assert_eq!(profit_factor(&signed), profit_factor(&signed_mixed));
        assert_eq!(value_at_risk(&signed, VAR_LEVEL), value_at_risk(&signed_mixed, VAR_LEVEL));
    }

    #[test]
    fn test_metric_kind_parse() {
        assert_eq!("Sharpe".parse::<MetricKind>().unwrap(), MetricKind::Sharpe);
        assert_eq!("pf".parse::<MetricKind>().unwrap(), MetricKind::ProfitFactor);
        assert_eq!(
            "max_drawdown".parse::<MetricKind>().unwrap().direction(),
            Direction::LowerIsWorse
        );
        assert!(matches!(
            "sortino".parse::<MetricKind>(),
            Err(Error::UndefinedMetric(_))
        ));
    }

    #[test]
    fn test_extreme_comparison_counts_ties() {
        assert!(MetricKind::Sharpe.is_at_least_as_extreme(1.0, 1.0));
        assert!(!MetricKind::Sharpe.is_at_least_as_extreme(0.9, 1.0));
        assert!(MetricKind::MaxDrawdown.is_at_least_as_extreme(-0.3, -0.2));
        assert!(!MetricKind::MaxDrawdown.is_at_least_as_extreme(-0.1, -0.2));
    }

    #[test]
    fn test_percentile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert_eq!(percentile(&v, 0.5), 3.0);
        assert!((percentile(&v, 0.05) - 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_summary() {
        let r = [0.02, -0.01, 0.0, 0.03, -0.02, f64::NAN];
        let s = PerformanceSummary::from_returns(&r, 252.0);
        assert_eq!(s.periods, 5);
        assert_eq!(s.active_bars, 4);
        assert!((s.win_rate - 50.0).abs() < 1e-12);
        assert!((s.profit_factor - 5.0 / 3.0).abs() < 1e-12);
        assert!(s.max_drawdown < 0.0);
        assert!(s.cvar_5 <= s.var_5);
    }
}
