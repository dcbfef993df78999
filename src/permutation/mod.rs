//! Bar-relative OHLC permutation for building synthetic price paths

mod encoder;
mod engine;

pub use encoder::{encode, EncodedMarket, LogBar, RelativeBarSet};
pub use engine::{BarPermutationEngine, PermutationOrder};
