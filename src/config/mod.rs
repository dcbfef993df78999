use crate::backtest::DEFAULT_PERIODS_PER_YEAR;
use crate::strategy::{DonchianConfig, RsiConfig};
use anyhow::{Context, Result};
use config::{Config as ConfigLoader, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub permutation: PermutationConfig,
    #[serde(default)]
    pub significance: SignificanceConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// One file per market; several files are permuted together
    pub paths: Vec<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            paths: vec![PathBuf::from("data/BTCUSD_1h.parquet")],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PermutationConfig {
    #[serde(default)]
    pub start_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TrialMode {
    /// Permute the price table and re-run the strategy
    #[default]
    Rerun,
    /// Shuffle the realized strategy returns
    ShuffleReturns,
}

impl TrialMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrialMode::Rerun => "rerun",
            TrialMode::ShuffleReturns => "shuffle_returns",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignificanceConfig {
    pub n_permutations: usize,
    pub random_seed: Option<u64>,
    pub metric: String,
    pub confidence_level: f64,
    pub periods_per_year: f64,
    pub trial_mode: TrialMode,
    pub parallel: bool,
    pub time_budget_secs: Option<u64>,
}

impl Default for SignificanceConfig {
    fn default() -> Self {
        Self {
            n_permutations: 1000,
            random_seed: None,
            metric: "sharpe".to_string(),
            confidence_level: 0.05,
            periods_per_year: DEFAULT_PERIODS_PER_YEAR,
            trial_mode: TrialMode::Rerun,
            parallel: true,
            time_budget_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub name: String,
    pub rsi: RsiConfig,
    pub donchian: DonchianConfig,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            name: "donchian".to_string(),
            rsi: RsiConfig::default(),
            donchian: DonchianConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub results_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from(config_path)
    }

    /// Load from a specific file (optional) layered with `MCPT__SECTION__KEY` variables
    pub fn load_from(config_path: PathBuf) -> Result<Self> {
        let settings = ConfigLoader::builder()
            .add_source(File::from(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("MCPT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        settings
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    fn config_path() -> PathBuf {
        // Try local config first, then default
        let local_config = PathBuf::from("config/default.toml");
        if local_config.exists() {
            return local_config;
        }

        // Fallback to executable directory
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let exe_config = exe_dir.join("config/default.toml");
                if exe_config.exists() {
                    return exe_config;
                }
            }
        }

        local_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.significance.n_permutations, 1000);
        assert_eq!(config.significance.metric, "sharpe");
        assert_eq!(config.significance.confidence_level, 0.05);
        assert_eq!(config.permutation.start_index, 0);
        assert_eq!(config.significance.random_seed, None);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcpt.toml");
        fs::write(
            &path,
            r#"
[significance]
n_permutations = 200
random_seed = 7
metric = "profit_factor"
trial_mode = "shuffle_returns"

[strategy]
name = "rsi"

[strategy.rsi]
oversold = 25.0
"#,
        )
        .unwrap();

        let config = Config::load_from(path).unwrap();
        assert_eq!(config.significance.n_permutations, 200);
        assert_eq!(config.significance.random_seed, Some(7));
        assert_eq!(config.significance.trial_mode, TrialMode::ShuffleReturns);
        assert_eq!(config.significance.confidence_level, 0.05);
        assert_eq!(config.strategy.rsi.oversold, 25.0);
        assert_eq!(config.strategy.rsi.period, 14);
    }
}
