//! Error types for the permutation and significance core

/// Errors raised by permutation, metric evaluation and the significance test.
///
/// All of these are caller or data errors detected before any randomness is consumed.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum Error {
    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("mismatched markets: {0}")]
    MismatchedMarkets(String),

    #[error("undefined metric: '{0}' (expected one of sharpe, profit_factor, total_return, max_drawdown)")]
    UndefinedMetric(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, Error>;
