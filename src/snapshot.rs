//! Snapshot Loader
//!
//! mtime-cached read of the producer's JSON snapshot file. The file is
//! written atomically by the external producer, so stat + read needs no
//! writer coordination. An absent or unreadable file degrades to the
//! empty snapshot; nothing here returns an error to callers.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::types::Snapshot;

/// Snapshot version: file mtime in milliseconds since epoch.
/// 0 means "no file".
pub type SnapshotVersion = u64;

struct CacheSlot {
    version: SnapshotVersion,
    snapshot: Arc<Snapshot>,
}

/// mtime-keyed snapshot cache; the invalidation signal for every
/// downstream consumer
pub struct SnapshotCache {
    path: PathBuf,
    slot: RwLock<CacheSlot>,
}

impl SnapshotCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            slot: RwLock::new(CacheSlot {
                version: 0,
                snapshot: Arc::new(Snapshot::empty()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current snapshot + version without touching the filesystem
    pub fn current(&self) -> (Arc<Snapshot>, SnapshotVersion) {
        let slot = self.slot.read().expect("snapshot cache poisoned");
        (Arc::clone(&slot.snapshot), slot.version)
    }

    /// Stat the file and reload when its mtime changed. Returns the
    /// snapshot, its version, and whether this call loaded a new one.
    pub fn refresh(&self) -> (Arc<Snapshot>, SnapshotVersion, bool) {
        let disk_version = file_mtime_ms(&self.path).unwrap_or(0);
        {
            let slot = self.slot.read().expect("snapshot cache poisoned");
            if slot.version == disk_version {
                return (Arc::clone(&slot.snapshot), slot.version, false);
            }
        }

        let snapshot = Arc::new(self.load_from_disk(disk_version));
        let mut slot = self.slot.write().expect("snapshot cache poisoned");
        // Another refresher may have won the race; keep the newer read.
        if slot.version == disk_version {
            return (Arc::clone(&slot.snapshot), slot.version, false);
        }
        slot.version = disk_version;
        slot.snapshot = Arc::clone(&snapshot);
        (snapshot, disk_version, true)
    }

    fn load_from_disk(&self, version: SnapshotVersion) -> Snapshot {
        if version == 0 {
            debug!(path = %self.path.display(), "snapshot file absent, serving empty");
            return Snapshot::empty();
        }
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<Snapshot>(&bytes) {
                Ok(snap) => {
                    debug!(
                        rows = snap.rows.len(),
                        day = %snap.day,
                        "snapshot reloaded"
                    );
                    snap
                }
                Err(err) => {
                    warn!(error = %err, "snapshot file unparseable, serving empty");
                    Snapshot::empty()
                }
            },
            Err(err) => {
                warn!(error = %err, "snapshot file unreadable, serving empty");
                Snapshot::empty()
            }
        }
    }

    /// File size (bytes) and mtime (ISO) for the dashboard stats block
    pub fn file_info(&self) -> (u64, Option<String>) {
        match fs::metadata(&self.path) {
            Ok(meta) => {
                let mtime = meta
                    .modified()
                    .ok()
                    .map(|t| DateTime::<Utc>::from(t).to_rfc3339());
                (meta.len(), mtime)
            }
            Err(_) => (0, None),
        }
    }
}

fn file_mtime_ms(path: &Path) -> Option<u64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    Some(since_epoch.as_millis() as u64)
}
