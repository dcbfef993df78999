//! Monte Carlo permutation significance testing

mod monte_carlo;
mod report;
mod trials;

pub use monte_carlo::{
    trial_rng, MonteCarloOutcome, MonteCarloSignificanceTest, TrialGenerator,
    MIN_RECOMMENDED_TRIALS,
};
pub use report::{
    next_version, save_report, versioned_path, write_trial_metrics, SavedReport, TestReport,
};
pub use trials::{ReturnShuffleTrials, StrategyRerunTrials};
