//! Writing test results to versioned flat files
//!
//! Each run writes `<stem>_V0001.json` (the full report) and `<stem>_V0001.csv` (the
//! trial metric distribution). The version is one past the highest existing version
//! for that stem, so earlier results are never overwritten.

use super::monte_carlo::MonteCarloOutcome;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Everything saved for one significance run
#[derive(Debug, Clone, Serialize)]
pub struct TestReport<'a> {
    pub created_at: DateTime<Utc>,
    pub strategy: String,
    pub markets: Vec<String>,
    pub n_bars: usize,
    pub start_index: usize,
    pub trial_mode: String,
    pub outcome: &'a MonteCarloOutcome,
}

/// Paths written by `save_report`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedReport {
    pub version: u32,
    pub json_path: PathBuf,
    pub csv_path: PathBuf,
}

/// Version number of `file_name` if it is `<stem>_V<digits>.<ext>`
fn parse_version(file_name: &str, stem: &str) -> Option<u32> {
    let rest = file_name.strip_prefix(stem)?.strip_prefix("_V")?;
    let (digits, _ext) = rest.split_once('.')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Next free version for `stem` in `dir` (1 if the directory is missing or empty)
pub fn next_version(dir: &Path, stem: &str) -> Result<u32> {
    if !dir.exists() {
        return Ok(1);
    }

    let mut latest = 0;
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let entry = entry?;
        if let Some(v) = entry.file_name().to_str().and_then(|n| parse_version(n, stem)) {
            latest = latest.max(v);
        }
    }

    Ok(latest + 1)
}

pub fn versioned_path(dir: &Path, stem: &str, version: u32, ext: &str) -> PathBuf {
    dir.join(format!("{}_V{:04}.{}", stem, version, ext))
}

/// Write the JSON report and the trial CSV under the next free version.
pub fn save_report(dir: &Path, stem: &str, report: &TestReport<'_>) -> Result<SavedReport> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let version = next_version(dir, stem)?;
    let json_path = versioned_path(dir, stem, version, "json");
    let csv_path = versioned_path(dir, stem, version, "csv");

    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    fs::write(&json_path, json)
        .with_context(|| format!("Failed to write {}", json_path.display()))?;

    write_trial_metrics(&csv_path, report.outcome)?;

    info!(
        "Saved results to {} and {}",
        json_path.display(),
        csv_path.display()
    );

    Ok(SavedReport {
        version,
        json_path,
        csv_path,
    })
}

/// One row per trial: index and metric value
pub fn write_trial_metrics(path: &Path, outcome: &MonteCarloOutcome) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    writer.write_record(["trial", outcome.metric_name()])?;
    for (trial, value) in outcome.permutation_metrics.iter().enumerate() {
        writer.write_record(&[trial.to_string(), value.to_string()])?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::MetricKind;
    use crate::significance::MonteCarloSignificanceTest;
    use rand_chacha::ChaCha8Rng;

    fn outcome() -> MonteCarloOutcome {
        let gen = |trial: usize, _: &mut ChaCha8Rng| -> crate::Result<Vec<f64>> {
            Ok(vec![trial as f64 / 10.0])
        };
        MonteCarloSignificanceTest::new(5, MetricKind::TotalReturn, 0.05)
            .unwrap()
            .with_seed(Some(1))
            .run(&[0.25], &gen)
            .unwrap()
    }

    fn report(outcome: &MonteCarloOutcome) -> TestReport<'_> {
        TestReport {
            created_at: Utc::now(),
            strategy: "Donchian".to_string(),
            markets: vec!["btc".to_string()],
            n_bars: 100,
            start_index: 0,
            trial_mode: "rerun".to_string(),
            outcome,
        }
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("mcpt_btc_V0003.json", "mcpt_btc"), Some(3));
        assert_eq!(parse_version("mcpt_btc_V12.csv", "mcpt_btc"), Some(12));
        assert_eq!(parse_version("mcpt_eth_V0003.json", "mcpt_btc"), None);
        assert_eq!(parse_version("mcpt_btc_Vx.json", "mcpt_btc"), None);
    }

    #[test]
    fn test_versions_increment() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = outcome();

        let first = save_report(dir.path(), "run", &report(&outcome)).unwrap();
        let second = save_report(dir.path(), "run", &report(&outcome)).unwrap();

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert!(first.json_path.ends_with("run_V0001.json"));
        assert!(second.csv_path.ends_with("run_V0002.csv"));
    }

    #[test]
    fn test_report_contents() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = outcome();
        let saved = save_report(dir.path(), "run", &report(&outcome)).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&saved.json_path).unwrap()).unwrap();
        assert_eq!(json["strategy"], "Donchian");
        assert_eq!(json["outcome"]["metric_name"], "total_return");
        assert_eq!(json["outcome"]["n_permutations"], 5);
        assert_eq!(json["outcome"]["seed"], 1);

        let csv = fs::read_to_string(&saved.csv_path).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "trial,total_return");
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[3], "2,0.2");
    }
}
