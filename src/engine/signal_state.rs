//! Signal State Store
//!
//! Per-(configuration, symbol) memory of the prior tick: previous
//! ltp/volume/volume-delta and the BE5 retest window. In-memory only;
//! entries for symbols absent from the most recent snapshot are
//! evicted at the end of a recomputation.

use std::collections::{HashMap, HashSet};

use crate::types::{FactorKind, Timeframe};

/// One derived-row configuration
pub type ConfigKey = (Timeframe, FactorKind);

/// Retained state for one symbol under one configuration
#[derive(Debug, Clone, Default)]
pub struct SignalState {
    pub prev_ltp: Option<f64>,
    pub prev_volume: Option<f64>,
    pub prev_vol_delta: f64,
    /// Epoch seconds of the most recent `ltp <= BE5` touch
    pub be5_touch_ts: Option<i64>,
    /// Running minimum ltp since the touch
    pub be5_min_ltp: Option<f64>,
    /// Volume at the touch (context for the reversal signal)
    pub be5_touch_volume: Option<f64>,
}

impl SignalState {
    /// Drop the BE5 retest window (touch aged out of the lookback)
    pub fn forget_touch(&mut self) {
        self.be5_touch_ts = None;
        self.be5_min_ltp = None;
        self.be5_touch_volume = None;
    }
}

/// All per-symbol signal state, partitioned by configuration
#[derive(Debug, Default)]
pub struct SignalStateStore {
    states: HashMap<ConfigKey, HashMap<String, SignalState>>,
}

impl SignalStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored state for a symbol; defaults to the blank state
    pub fn get(&self, config: ConfigKey, symbol: &str) -> SignalState {
        self.states
            .get(&config)
            .and_then(|m| m.get(symbol))
            .cloned()
            .unwrap_or_default()
    }

    /// Commit the state derived from the current row; it becomes the
    /// "previous" baseline for the next recomputation only.
    pub fn commit(&mut self, config: ConfigKey, symbol: &str, state: SignalState) {
        self.states
            .entry(config)
            .or_default()
            .insert(symbol.to_string(), state);
    }

    /// Evict symbols under a config that the latest snapshot no longer
    /// carries
    pub fn retain_symbols(&mut self, config: ConfigKey, seen: &HashSet<String>) {
        if let Some(map) = self.states.get_mut(&config) {
            map.retain(|symbol, _| seen.contains(symbol));
        }
    }

    pub fn len(&self, config: ConfigKey) -> usize {
        self.states.get(&config).map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, config: ConfigKey) -> bool {
        self.len(config) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CFG: ConfigKey = (Timeframe::M5, FactorKind::Smart);

    #[test]
    fn get_commit_round_trip() {
        let mut store = SignalStateStore::new();
        assert!(store.get(CFG, "NSE|1").prev_ltp.is_none());

        store.commit(
            CFG,
            "NSE|1",
            SignalState {
                prev_ltp: Some(101.0),
                prev_volume: Some(5000.0),
                prev_vol_delta: 200.0,
                ..Default::default()
            },
        );
        let state = store.get(CFG, "NSE|1");
        assert_eq!(state.prev_ltp, Some(101.0));
        assert_eq!(state.prev_vol_delta, 200.0);

        // A different config sees nothing
        let other = (Timeframe::M15, FactorKind::Smart);
        assert!(store.get(other, "NSE|1").prev_ltp.is_none());
    }

    #[test]
    fn eviction_drops_unseen_symbols() {
        let mut store = SignalStateStore::new();
        store.commit(CFG, "NSE|1", SignalState::default());
        store.commit(CFG, "NSE|2", SignalState::default());
        assert_eq!(store.len(CFG), 2);

        let seen: HashSet<String> = ["NSE|2".to_string()].into_iter().collect();
        store.retain_symbols(CFG, &seen);
        assert_eq!(store.len(CFG), 1);
        assert!(store.get(CFG, "NSE|2").prev_ltp.is_none());
    }

    #[test]
    fn forget_touch_clears_retest_window() {
        let mut state = SignalState {
            be5_touch_ts: Some(1_700_000_000),
            be5_min_ltp: Some(98.0),
            be5_touch_volume: Some(1000.0),
            ..Default::default()
        };
        state.forget_touch();
        assert!(state.be5_touch_ts.is_none());
        assert!(state.be5_min_ltp.is_none());
        assert!(state.be5_touch_volume.is_none());
    }
}
