//! Config-Keyed Derived Cache
//!
//! Memoizes engine output per (snapshot version, timeframe, factor).
//! A version change purges the whole cache before any new entry is
//! inserted, so readers can never mix rows from two snapshots.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::signal_state::ConfigKey;
use crate::engine::EngineOutput;
use crate::snapshot::SnapshotVersion;

#[derive(Debug, Default)]
pub struct DerivedCache {
    version: SnapshotVersion,
    entries: HashMap<ConfigKey, Arc<EngineOutput>>,
}

impl DerivedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> SnapshotVersion {
        self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Memoized lookup. The compute closure runs at most once per
    /// (version, config); a stale version empties the cache first.
    pub fn get_or_compute(
        &mut self,
        version: SnapshotVersion,
        key: ConfigKey,
        compute: impl FnOnce() -> EngineOutput,
    ) -> Arc<EngineOutput> {
        if self.version != version {
            self.entries.clear();
            self.version = version;
        }
        if let Some(hit) = self.entries.get(&key) {
            return Arc::clone(hit);
        }
        let out = Arc::new(compute());
        self.entries.insert(key, Arc::clone(&out));
        out
    }
}
