//! Strategy Comparator
//!
//! Runs multiple strategies on the same data and compares results.

use super::engine::{BacktestEngine, BacktestResult};
use crate::config::StrategyConfig;
use crate::data::OhlcTable;
use crate::strategy::create_strategy;
use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::{info, warn};

/// Result of comparing multiple strategies
#[derive(Debug)]
pub struct ComparisonResult {
    pub market: String,
    pub bars: usize,
    pub results: Vec<(String, BacktestResult)>,
}

impl ComparisonResult {
    /// Get the best strategy by total log return
    pub fn best_by_return(&self) -> Option<&(String, BacktestResult)> {
        self.results.iter().max_by(|a, b| {
            a.1.summary
                .total_return
                .partial_cmp(&b.1.summary.total_return)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    /// Get the best strategy by Sharpe ratio
    pub fn best_by_sharpe(&self) -> Option<&(String, BacktestResult)> {
        self.results
            .iter()
            .filter(|(_, r)| !r.summary.sharpe_ratio.is_nan())
            .max_by(|a, b| {
                a.1.summary
                    .sharpe_ratio
                    .partial_cmp(&b.1.summary.sharpe_ratio)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    /// Export results to CSV
    pub fn export_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path).context("Failed to create CSV file")?;

        writer.write_record([
            "strategy",
            "trades",
            "win_rate",
            "total_return",
            "profit_factor",
            "sharpe_ratio",
            "sortino_ratio",
            "max_drawdown",
            "calmar_ratio",
            "var_5",
            "cvar_5",
        ])?;

        for (name, result) in &self.results {
            let s = &result.summary;
            writer.write_record(&[
                name.clone(),
                result.total_trades().to_string(),
                format!("{:.2}", s.win_rate),
                format!("{:.6}", s.total_return),
                format!("{:.4}", s.profit_factor),
                format!("{:.4}", s.sharpe_ratio),
                format!("{:.4}", s.sortino_ratio),
                format!("{:.6}", s.max_drawdown),
                format!("{:.4}", s.calmar_ratio),
                format!("{:.6}", s.var_5),
                format!("{:.6}", s.cvar_5),
            ])?;
        }

        writer.flush()?;
        Ok(())
    }
}

/// Compare multiple strategies on the same table
pub fn compare_strategies(
    strategy_names: &[String],
    table: &OhlcTable,
    strategy_config: &StrategyConfig,
    engine: &BacktestEngine,
) -> Result<ComparisonResult> {
    info!(
        "Comparing {} strategies on {} ({} bars)",
        strategy_names.len(),
        table.name(),
        table.len()
    );

    let mut results = Vec::new();

    for name in strategy_names {
        let strategy = match create_strategy(name, strategy_config) {
            Some(s) => s,
            None => {
                warn!("Unknown strategy: {}", name);
                continue;
            }
        };

        info!("Running strategy: {}", strategy.name());
        let result = engine.run(strategy.as_ref(), table);

        info!(
            "  {} trades, {:.4} total return",
            result.total_trades(),
            result.summary.total_return
        );

        results.push((strategy.name().to_string(), result));
    }

    if results.is_empty() {
        bail!("None of the requested strategies exist: {}", strategy_names.join(", "));
    }

    // Sort by total return descending
    results.sort_by(|a, b| {
        b.1.summary
            .total_return
            .partial_cmp(&a.1.summary.total_return)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(ComparisonResult {
        market: table.name().to_string(),
        bars: table.len(),
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Bar;

    fn zigzag() -> OhlcTable {
        let bars = (0..120)
            .map(|i| {
                let c = 100.0 + 10.0 * ((i as f64) / 6.0).sin() + i as f64 * 0.05;
                Bar::new(c, c + 0.5, c - 0.5, c)
            })
            .collect();
        OhlcTable::new("zigzag", bars).unwrap()
    }

    #[test]
    fn test_compare_sorts_and_exports() {
        let table = zigzag();
        let names = vec!["rsi".to_string(), "donchian".to_string(), "nope".to_string()];
        let comparison =
            compare_strategies(&names, &table, &StrategyConfig::default(), &BacktestEngine::new(252.0))
                .unwrap();

        assert_eq!(comparison.results.len(), 2);
        assert!(
            comparison.results[0].1.summary.total_return
                >= comparison.results[1].1.summary.total_return
        );
        assert_eq!(
            comparison.best_by_return().unwrap().0,
            comparison.results[0].0
        );
        let (_, best) = comparison.best_by_sharpe().unwrap();
        assert!(comparison
            .results
            .iter()
            .all(|(_, r)| r.summary.sharpe_ratio <= best.summary.sharpe_ratio));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compare.csv");
        comparison.export_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("strategy,trades"));
    }

    #[test]
    fn test_compare_unknown_only() {
        let names = vec!["momentum".to_string()];
        assert!(compare_strategies(
            &names,
            &zigzag(),
            &StrategyConfig::default(),
            &BacktestEngine::new(252.0)
        )
        .is_err());
    }
}
