//! Backtesting: strategy returns, performance metrics and strategy comparison

mod comparator;
mod engine;
mod metrics;

pub use comparator::{compare_strategies, ComparisonResult};
pub use engine::{BacktestEngine, BacktestResult};
pub use metrics::{
    calmar_ratio, max_drawdown, percentile, profit_factor, sharpe_ratio, sortino_ratio,
    total_return, value_at_risk, Direction, MetricKind, PerformanceSummary,
    DEFAULT_PERIODS_PER_YEAR, METRIC_NAMES, VAR_LEVEL,
};
