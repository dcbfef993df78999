//! Position state machine
//!
//! Strategies emit raw buy/sell/hold signals and optional exit flags. `transition` turns
//! those into a position per bar and records each change of state.

use crate::data::OhlcTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What a strategy asks for on one bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RawSignal {
    Buy,
    Sell,
    #[default]
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum PositionState {
    Long,
    Short,
    #[default]
    Neutral,
}

impl PositionState {
    /// Exposure used when computing returns
    pub fn exposure(&self) -> f64 {
        match self {
            PositionState::Long => 1.0,
            PositionState::Short => -1.0,
            PositionState::Neutral => 0.0,
        }
    }
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PositionState::Long => "LONG",
            PositionState::Short => "SHORT",
            PositionState::Neutral => "NEUTRAL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignalChange {
    NeutralToLong,
    ShortToLong,
    LongToNeutral,
    LongToShort,
    NeutralToShort,
    ShortToNeutral,
}

impl SignalChange {
    /// The change between two states, if they differ.
    pub fn between(from: PositionState, to: PositionState) -> Option<Self> {
        use PositionState::*;
        match (from, to) {
            (Neutral, Long) => Some(SignalChange::NeutralToLong),
            (Short, Long) => Some(SignalChange::ShortToLong),
            (Long, Neutral) => Some(SignalChange::LongToNeutral),
            (Long, Short) => Some(SignalChange::LongToShort),
            (Neutral, Short) => Some(SignalChange::NeutralToShort),
            (Short, Neutral) => Some(SignalChange::ShortToNeutral),
            _ => None,
        }
    }

    /// Opens a position from flat, or flips into a new one
    pub fn is_entry(&self) -> bool {
        !matches!(self, SignalChange::LongToNeutral | SignalChange::ShortToNeutral)
    }
}

impl fmt::Display for SignalChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalChange::NeutralToLong => "NEUTRAL_TO_LONG",
            SignalChange::ShortToLong => "SHORT_TO_LONG",
            SignalChange::LongToNeutral => "LONG_TO_NEUTRAL",
            SignalChange::LongToShort => "LONG_TO_SHORT",
            SignalChange::NeutralToShort => "NEUTRAL_TO_SHORT",
            SignalChange::ShortToNeutral => "SHORT_TO_NEUTRAL",
        };
        f.write_str(s)
    }
}

/// One step of the state machine.
///
/// An exit flag on an open position wins over the raw signal. In long-only mode a sell
/// closes a long and is otherwise ignored.
pub fn transition(
    state: PositionState,
    raw: RawSignal,
    exit: bool,
    long_only: bool,
) -> (PositionState, Option<SignalChange>) {
    if exit && state != PositionState::Neutral {
        return (
            PositionState::Neutral,
            SignalChange::between(state, PositionState::Neutral),
        );
    }

    let next = match raw {
        RawSignal::Buy => PositionState::Long,
        RawSignal::Sell if long_only => match state {
            PositionState::Long => PositionState::Neutral,
            other => other,
        },
        RawSignal::Sell => PositionState::Short,
        RawSignal::Hold => state,
    };

    (next, SignalChange::between(state, next))
}

/// Positions and changes for every bar of a run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignalResult {
    pub positions: Vec<PositionState>,
    pub changes: Vec<Option<SignalChange>>,
}

impl SignalResult {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn position_counts(&self) -> BTreeMap<PositionState, usize> {
        let mut counts = BTreeMap::new();
        for p in &self.positions {
            *counts.entry(*p).or_insert(0) += 1;
        }
        counts
    }

    pub fn change_counts(&self) -> BTreeMap<SignalChange, usize> {
        let mut counts = BTreeMap::new();
        for c in self.changes.iter().flatten() {
            *counts.entry(*c).or_insert(0) += 1;
        }
        counts
    }

    /// Number of positions opened (including flips)
    pub fn entries(&self) -> usize {
        self.changes.iter().flatten().filter(|c| c.is_entry()).count()
    }
}

/// Runs the state machine over whole signal series, starting flat.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalManager {
    long_only: bool,
}

impl SignalManager {
    pub fn new(long_only: bool) -> Self {
        Self { long_only }
    }

    pub fn generate(&self, raw: &[RawSignal], exits: Option<&[bool]>) -> SignalResult {
        let mut state = PositionState::Neutral;
        let mut result = SignalResult {
            positions: Vec::with_capacity(raw.len()),
            changes: Vec::with_capacity(raw.len()),
        };

        for (i, &signal) in raw.iter().enumerate() {
            let exit = exits.and_then(|e| e.get(i).copied()).unwrap_or(false);
            let (next, change) = transition(state, signal, exit, self.long_only);
            state = next;
            result.positions.push(next);
            result.changes.push(change);
        }

        result
    }
}

/// Position held on bar i times the log return from close i to close i+1.
/// The final bar has no forward return and yields NaN.
pub fn strategy_returns(table: &OhlcTable, signals: &SignalResult) -> Vec<f64> {
    table
        .forward_log_returns()
        .into_iter()
        .zip(&signals.positions)
        .map(|(r, p)| r * p.exposure())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Bar;
    use PositionState::*;
    use RawSignal::*;

    #[test]
    fn test_transition_table() {
        assert_eq!(transition(Neutral, Buy, false, false), (Long, Some(SignalChange::NeutralToLong)));
        assert_eq!(transition(Short, Buy, false, false), (Long, Some(SignalChange::ShortToLong)));
        assert_eq!(transition(Long, Buy, false, false), (Long, None));
        assert_eq!(transition(Neutral, Sell, false, false), (Short, Some(SignalChange::NeutralToShort)));
        assert_eq!(transition(Long, Sell, false, false), (Short, Some(SignalChange::LongToShort)));
        assert_eq!(transition(Short, Hold, false, false), (Short, None));
    }

    #[test]
    fn test_long_only_sell_exits() {
        assert_eq!(transition(Long, Sell, false, true), (Neutral, Some(SignalChange::LongToNeutral)));
        assert_eq!(transition(Neutral, Sell, false, true), (Neutral, None));
    }

    #[test]
    fn test_exit_wins_over_signal() {
        assert_eq!(transition(Short, Buy, true, false), (Neutral, Some(SignalChange::ShortToNeutral)));
        // exit flag while flat does nothing special
        assert_eq!(transition(Neutral, Buy, true, false), (Long, Some(SignalChange::NeutralToLong)));
    }

    #[test]
    fn test_manager_counts() {
        let raw = [Hold, Buy, Hold, Sell, Hold, Buy];
        let result = SignalManager::new(false).generate(&raw, None);
        assert_eq!(result.positions, vec![Neutral, Long, Long, Short, Short, Long]);
        assert_eq!(result.entries(), 3);
        assert_eq!(result.position_counts()[&Long], 3);
        assert_eq!(result.change_counts()[&SignalChange::LongToShort], 1);
    }

    #[test]
    fn test_strategy_returns_alignment() {
        let table = OhlcTable::new(
            "t",
            vec![
                Bar::new(1.0, 1.0, 1.0, 1.0),
                Bar::new(1.0, 2.0, 1.0, 2.0),
                Bar::new(2.0, 2.0, 1.0, 1.0),
            ],
        )
        .unwrap();
        let signals = SignalManager::new(false).generate(&[Buy, Sell, Hold], None);
        let r = strategy_returns(&table, &signals);
        assert!((r[0] - 2f64.ln()).abs() < 1e-12);
        assert!((r[1] - 2f64.ln()).abs() < 1e-12); // short into a halving
        assert!(r[2].is_nan());
    }
}
