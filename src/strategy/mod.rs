pub mod base;
pub mod breakout;
pub mod indicators;
pub mod registry;
pub mod rsi;
pub mod signals;

pub use base::Strategy;
pub use breakout::{DonchianBreakoutStrategy, DonchianConfig};
pub use registry::{create_strategy, parse_strategy_list, STRATEGY_NAMES};
pub use rsi::{RsiConfig, RsiStrategy};
pub use signals::{
    strategy_returns, transition, PositionState, RawSignal, SignalChange, SignalManager,
    SignalResult,
};
