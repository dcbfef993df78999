//! Monte Carlo significance test
//!
//! Compares a strategy's actual metric against the metrics of `n_trials` null trials.
//! Each trial draws from its own ChaCha8 stream (master seed, stream = trial index), so
//! results are identical whether trials run sequentially or on the rayon pool.

use crate::backtest::{MetricKind, DEFAULT_PERIODS_PER_YEAR};
use crate::error::{Error, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Below this many trials the empirical p-value is too coarse to rely on
pub const MIN_RECOMMENDED_TRIALS: usize = 100;

/// Produces one null-hypothesis returns series per trial.
pub trait TrialGenerator: Sync {
    fn generate(&self, trial: usize, rng: &mut ChaCha8Rng) -> Result<Vec<f64>>;
}

impl<F> TrialGenerator for F
where
    F: Fn(usize, &mut ChaCha8Rng) -> Result<Vec<f64>> + Sync,
{
    fn generate(&self, trial: usize, rng: &mut ChaCha8Rng) -> Result<Vec<f64>> {
        self(trial, rng)
    }
}

/// The RNG handed to `trial` under `master_seed`.
pub fn trial_rng(master_seed: u64, trial: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(master_seed);
    rng.set_stream(trial as u64);
    rng
}

/// Result of one significance test
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonteCarloOutcome {
    #[serde(rename = "metric_name")]
    pub metric: MetricKind,
    pub actual_metric: f64,
    /// Trial metrics in trial order
    pub permutation_metrics: Vec<f64>,
    pub p_value: f64,
    pub is_significant: bool,
    pub confidence_level: f64,
    /// Mean of the finite trial metrics
    pub mean: f64,
    /// Population standard deviation of the finite trial metrics
    pub std: f64,
    pub z_score: f64,
    pub n_permutations: usize,
    pub n_completed: usize,
    /// Trial metrics that were infinite or NaN (e.g. profit factor without losses)
    pub n_undefined: usize,
    /// The time budget ran out before every trial was scheduled
    pub truncated: bool,
    pub seed: u64,
    pub elapsed_secs: f64,
}

impl MonteCarloOutcome {
    pub fn metric_name(&self) -> &'static str {
        self.metric.name()
    }

    /// Human-readable report
    pub fn summary_text(&self) -> String {
        let verdict = if self.is_significant {
            "significant"
        } else {
            "not significant"
        };
        let interpretation = if self.is_significant {
            "Strategy performance is unlikely under the permutation null; the edge depends on the order of price moves."
        } else {
            "Strategy performance is consistent with the permutation null and may be due to chance."
        };

        let mut text = format!(
            "Monte Carlo Significance Test Results\n\
             =====================================\n\
             Metric Tested: {}\n\
             Trials: {} of {} completed (seed {})\n\
             P-value: {:.6}\n\
             Result: {} (alpha = {})\n\
             \n\
             Actual Performance: {:.6}\n\
             Random Performance: {:.6} +/- {:.6}\n\
             Z-score: {:.3}\n",
            self.metric,
            self.n_completed,
            self.n_permutations,
            self.seed,
            self.p_value,
            verdict,
            self.confidence_level,
            self.actual_metric,
            self.mean,
            self.std,
            self.z_score,
        );

        if self.n_undefined > 0 {
            text.push_str(&format!(
                "Undefined trial metrics: {} (excluded from mean/std)\n",
                self.n_undefined
            ));
        }
        if self.truncated {
            text.push_str("Warning: time budget reached, result uses the completed trials only\n");
        }

        text.push_str(&format!("\nInterpretation: {}", interpretation));
        text
    }
}

#[derive(Debug, Clone)]
pub struct MonteCarloSignificanceTest {
    n_trials: usize,
    metric: MetricKind,
    confidence_level: f64,
    periods_per_year: f64,
    seed: Option<u64>,
    parallel: bool,
    time_budget: Option<Duration>,
}

impl MonteCarloSignificanceTest {
    /// Fails with `InvalidParameter` for zero trials or a confidence level outside (0, 1).
    pub fn new(n_trials: usize, metric: MetricKind, confidence_level: f64) -> Result<Self> {
        if n_trials == 0 {
            return Err(Error::InvalidParameter("n_trials must be at least 1".to_string()));
        }
        if !(confidence_level > 0.0 && confidence_level < 1.0) {
            return Err(Error::InvalidParameter(format!(
                "confidence_level must be in (0, 1), got {}",
                confidence_level
            )));
        }

        Ok(Self {
            n_trials,
            metric,
            confidence_level,
            periods_per_year: DEFAULT_PERIODS_PER_YEAR,
            seed: None,
            parallel: true,
            time_budget: None,
        })
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_periods_per_year(mut self, periods_per_year: f64) -> Result<Self> {
        if !(periods_per_year > 0.0 && periods_per_year.is_finite()) {
            return Err(Error::InvalidParameter(format!(
                "periods_per_year must be positive, got {}",
                periods_per_year
            )));
        }
        self.periods_per_year = periods_per_year;
        Ok(self)
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Stop scheduling trials once this much wall-clock time has passed.
    pub fn with_time_budget(mut self, budget: Option<Duration>) -> Self {
        self.time_budget = budget;
        self
    }

    pub fn run<G: TrialGenerator + ?Sized>(
        &self,
        actual_returns: &[f64],
        generator: &G,
    ) -> Result<MonteCarloOutcome> {
        if self.n_trials < MIN_RECOMMENDED_TRIALS {
            warn!(
                "Only {} trials requested, the p-value resolution is 1/{}; use at least {}",
                self.n_trials, self.n_trials, MIN_RECOMMENDED_TRIALS
            );
        }

        let seed = self.seed.unwrap_or_else(rand::random);
        let actual_metric = self.metric.evaluate(actual_returns, self.periods_per_year);

        info!(
            "Running {} trials on {} (actual = {:.6}, seed = {}, parallel = {})",
            self.n_trials, self.metric, actual_metric, seed, self.parallel
        );

        let start = Instant::now();
        let deadline = self.time_budget.map(|budget| start + budget);

        let run_trial = |trial: usize| -> Option<Result<f64>> {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return None;
            }
            let mut rng = trial_rng(seed, trial);
            let metric = generator
                .generate(trial, &mut rng)
                .map(|returns| self.metric.evaluate(&returns, self.periods_per_year));
            if let Ok(m) = &metric {
                debug!("Trial {}: {:.6}", trial, m);
            }
            Some(metric)
        };

        let results: Vec<Option<Result<f64>>> = if self.parallel {
            (0..self.n_trials).into_par_iter().map(run_trial).collect()
        } else {
            (0..self.n_trials).map(run_trial).collect()
        };

        let mut permutation_metrics = Vec::with_capacity(self.n_trials);
        for result in results.into_iter().flatten() {
            permutation_metrics.push(result?);
        }

        let n_completed = permutation_metrics.len();
        let truncated = n_completed < self.n_trials;
        if n_completed == 0 {
            return Err(Error::InvalidParameter(
                "time budget expired before any trial completed".to_string(),
            ));
        }
        if truncated {
            warn!(
                "Time budget reached: {} of {} trials completed",
                n_completed, self.n_trials
            );
        }

        let extreme = permutation_metrics
            .iter()
            .filter(|&&m| self.metric.is_at_least_as_extreme(m, actual_metric))
            .count();
        let p_value = extreme as f64 / n_completed as f64;
        let is_significant = p_value < self.confidence_level;

        let finite: Vec<f64> = permutation_metrics
            .iter()
            .copied()
            .filter(|m| m.is_finite())
            .collect();
        let n_undefined = n_completed - finite.len();
        let (mean, std) = mean_and_population_std(&finite);
        let z_score = if std > 0.0 && actual_metric.is_finite() {
            (actual_metric - mean) / std
        } else {
            0.0
        };

        let elapsed_secs = start.elapsed().as_secs_f64();
        info!(
            "Monte Carlo test complete: p = {:.4} ({}), z = {:.3}, {:.2}s",
            p_value,
            if is_significant { "significant" } else { "not significant" },
            z_score,
            elapsed_secs
        );

        Ok(MonteCarloOutcome {
            metric: self.metric,
            actual_metric,
            permutation_metrics,
            p_value,
            is_significant,
            confidence_level: self.confidence_level,
            mean,
            std,
            z_score,
            n_permutations: self.n_trials,
            n_completed,
            n_undefined,
            truncated,
            seed,
            elapsed_secs,
        })
    }
}

fn mean_and_population_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    if values.iter().all(|&v| v == values[0]) {
        return (values[0], 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::Rng;

    /// Trial i returns a series whose total return is exactly i
    fn indexed(trial: usize, _rng: &mut ChaCha8Rng) -> Result<Vec<f64>> {
        Ok(vec![trial as f64, 0.0])
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(matches!(
            MonteCarloSignificanceTest::new(0, MetricKind::Sharpe, 0.05),
            Err(Error::InvalidParameter(_))
        ));
        assert!(MonteCarloSignificanceTest::new(10, MetricKind::Sharpe, 0.0).is_err());
        assert!(MonteCarloSignificanceTest::new(10, MetricKind::Sharpe, 1.0).is_err());
    }

    #[test]
    fn test_p_value_counts_ties_and_excludes_actual() {
        // actual total return 90; trials 0..100 => 90..=99 are >= actual
        let test = MonteCarloSignificanceTest::new(100, MetricKind::TotalReturn, 0.05)
            .unwrap()
            .with_seed(Some(1));
        let outcome = test.run(&[90.0], &indexed).unwrap();
        assert_eq!(outcome.p_value, 0.10);
        assert!(!outcome.is_significant);
        assert_eq!(outcome.permutation_metrics.len(), 100);
        assert_eq!(outcome.permutation_metrics[42], 42.0);
    }

    #[test]
    fn test_minimum_p_value_is_zero() {
        let test = MonteCarloSignificanceTest::new(50, MetricKind::TotalReturn, 0.05).unwrap();
        let outcome = test.run(&[1000.0], &indexed).unwrap();
        assert_eq!(outcome.p_value, 0.0);
        assert!(outcome.is_significant);
        assert!(outcome.z_score > 0.0);
    }

    #[test]
    fn test_drawdown_uses_lower_rule() {
        // trial drawdowns: -t/100 for t in 0..100; actual -0.05 => trials 5..=99 are <= actual
        let test = MonteCarloSignificanceTest::new(100, MetricKind::MaxDrawdown, 0.05).unwrap();
        let gen = |trial: usize, _: &mut ChaCha8Rng| -> Result<Vec<f64>> {
            Ok(vec![0.0, -(trial as f64) / 100.0])
        };
        let outcome = test.run(&[0.0, -0.05], &gen).unwrap();
        assert!((outcome.p_value - 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_shuffled_returns_tie_on_order_invariant_metric() {
        // Dyadic values keep every sum exact regardless of order
        let actual: Vec<f64> = (1..=32).map(|i| i as f64 / 64.0).collect();
        let test = MonteCarloSignificanceTest::new(200, MetricKind::TotalReturn, 0.05)
            .unwrap()
            .with_seed(Some(42));
        let gen = |_: usize, rng: &mut ChaCha8Rng| -> Result<Vec<f64>> {
            let mut r = actual.clone();
            r.shuffle(rng);
            Ok(r)
        };
        let outcome = test.run(&actual, &gen).unwrap();
        assert_eq!(outcome.p_value, 1.0);
        assert!(!outcome.is_significant);
        assert_eq!(outcome.std, 0.0);
        assert_eq!(outcome.z_score, 0.0);
    }

    #[test]
    fn test_shuffled_trending_returns_tie_on_sharpe() {
        let actual: Vec<f64> = (1..=50).map(|i| 0.001 * i as f64).collect();
        let test = MonteCarloSignificanceTest::new(200, MetricKind::Sharpe, 0.05)
            .unwrap()
            .with_seed(Some(42));
        let gen = |_: usize, rng: &mut ChaCha8Rng| -> Result<Vec<f64>> {
            let mut r = actual.clone();
            r.shuffle(rng);
            Ok(r)
        };
        let outcome = test.run(&actual, &gen).unwrap();
        assert!(outcome.permutation_metrics.iter().all(|&m| m == outcome.actual_metric));
        assert_eq!(outcome.p_value, 1.0);
        assert!(!outcome.is_significant);
        assert_eq!(outcome.std, 0.0);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let gen = |_: usize, rng: &mut ChaCha8Rng| -> Result<Vec<f64>> {
            Ok((0..50).map(|_| rng.gen_range(-0.01..0.01)).collect())
        };
        let base = MonteCarloSignificanceTest::new(64, MetricKind::Sharpe, 0.05)
            .unwrap()
            .with_seed(Some(9));
        let a = base.clone().with_parallel(true).run(&[0.01, 0.02, -0.01], &gen).unwrap();
        let b = base.with_parallel(false).run(&[0.01, 0.02, -0.01], &gen).unwrap();
        assert_eq!(a.permutation_metrics, b.permutation_metrics);
        assert_eq!(a.p_value, b.p_value);
    }

    #[test]
    fn test_p_value_bounds_and_verdict() {
        let gen = |_: usize, rng: &mut ChaCha8Rng| -> Result<Vec<f64>> {
            Ok((0..30).map(|_| rng.gen_range(-0.02..0.02)).collect())
        };
        for seed in 0..5 {
            let outcome = MonteCarloSignificanceTest::new(120, MetricKind::Sharpe, 0.1)
                .unwrap()
                .with_seed(Some(seed))
                .run(&[0.001, 0.003, -0.002, 0.004], &gen)
                .unwrap();
            assert!((0.0..=1.0).contains(&outcome.p_value));
            assert_eq!(outcome.is_significant, outcome.p_value < 0.1);
            assert_eq!(outcome.seed, seed);
        }
    }

    #[test]
    fn test_infinite_trial_metrics_are_undefined() {
        let gen = |trial: usize, _: &mut ChaCha8Rng| -> Result<Vec<f64>> {
            if trial % 2 == 0 {
                Ok(vec![0.1, 0.2])
            } else {
                Ok(vec![0.1, -0.1])
            }
        };
        let outcome = MonteCarloSignificanceTest::new(10, MetricKind::ProfitFactor, 0.05)
            .unwrap()
            .run(&[0.3, -0.1], &gen)
            .unwrap();
        assert_eq!(outcome.n_undefined, 5);
        assert_eq!(outcome.mean, 1.0);
        assert_eq!(outcome.p_value, 0.5);
    }

    #[test]
    fn test_zero_time_budget_fails() {
        let test = MonteCarloSignificanceTest::new(10, MetricKind::Sharpe, 0.05)
            .unwrap()
            .with_parallel(false)
            .with_time_budget(Some(Duration::ZERO));
        assert!(test.run(&[0.1, 0.2], &indexed).is_err());
    }

    #[test]
    fn test_generator_error_propagates() {
        let gen = |_: usize, _: &mut ChaCha8Rng| -> Result<Vec<f64>> {
            Err(Error::InvalidRange("boom".to_string()))
        };
        let test = MonteCarloSignificanceTest::new(3, MetricKind::Sharpe, 0.05).unwrap();
        assert!(matches!(test.run(&[0.1], &gen), Err(Error::InvalidRange(_))));
    }

    #[test]
    fn test_summary_text() {
        let outcome = MonteCarloSignificanceTest::new(20, MetricKind::TotalReturn, 0.05)
            .unwrap()
            .with_seed(Some(3))
            .run(&[100.0], &indexed)
            .unwrap();
        let text = outcome.summary_text();
        assert!(text.contains("Metric Tested: total_return"));
        assert!(text.contains("significant"));
        assert!(text.contains("seed 3"));
    }
}
