//! OHLC data model and file loading

pub mod bars;
pub mod loader;

pub use bars::{Bar, MultiMarketOhlc, OhlcTable};
pub use loader::{load_markets, load_ohlc, write_ohlc};
