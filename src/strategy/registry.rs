//! Strategy Registry
//!
//! Factory for creating strategies by name.

use super::base::Strategy;
use super::breakout::DonchianBreakoutStrategy;
use super::rsi::RsiStrategy;
use crate::config::StrategyConfig;

/// Available strategy names
pub const STRATEGY_NAMES: &[&str] = &["rsi", "donchian"];

/// Create a strategy by name
pub fn create_strategy(name: &str, config: &StrategyConfig) -> Option<Box<dyn Strategy>> {
    match name.trim().to_lowercase().as_str() {
        "rsi" => Some(Box::new(RsiStrategy::new(config.rsi.clone()))),

        "donchian" | "breakout" | "donchian_breakout" => {
            Some(Box::new(DonchianBreakoutStrategy::new(config.donchian.clone())))
        }

        _ => None,
    }
}

/// Parse a comma-separated list of strategy names
pub fn parse_strategy_list(list: &str) -> Vec<String> {
    if list.to_lowercase() == "all" {
        return STRATEGY_NAMES.iter().map(|s| s.to_string()).collect();
    }

    list.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_by_alias() {
        let config = StrategyConfig::default();
        assert_eq!(create_strategy("breakout", &config).unwrap().name(), "Donchian");
        assert_eq!(create_strategy("RSI", &config).unwrap().name(), "RSI");
        assert!(create_strategy("momentum", &config).is_none());
        assert!(STRATEGY_NAMES
            .iter()
            .all(|name| create_strategy(name, &config).is_some()));
    }

    #[test]
    fn test_parse_strategy_list() {
        assert_eq!(parse_strategy_list("all"), vec!["rsi", "donchian"]);
        assert_eq!(parse_strategy_list(" RSI , ,donchian"), vec!["rsi", "donchian"]);
    }
}
