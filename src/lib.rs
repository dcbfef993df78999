pub mod backtest;
pub mod config;
pub mod data;
pub mod error;
pub mod permutation;
pub mod significance;
pub mod strategy;

pub use config::Config;
pub use error::{Error, Result};
