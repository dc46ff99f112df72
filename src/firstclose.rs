//! Symbol/FirstClose Reader
//!
//! Read-only queries against the producer's first-close DB. Only row
//! counts and the pending-symbol count are consumed; any failure
//! (absent DB, locked file, missing table) degrades the stats to
//! zeros and never reaches a view.

use std::path::{Path, PathBuf};

use anyhow::Result;
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use tracing::debug;

/// Counts surfaced in the dashboard stats block
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FirstCloseStats {
    /// `first_closes` rows for the requested day
    pub today_rows: i64,
    /// `first_closes` rows for earlier days
    pub history_rows: i64,
    /// `history_state` rows still pending (`done = 0`)
    pub pending_symbols: i64,
}

pub struct FirstCloseReader {
    path: PathBuf,
}

impl FirstCloseReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(std::time::Duration::from_millis(2000))?;
        Ok(conn)
    }

    /// Stats for a day, zeroed when the DB is unavailable
    pub fn stats(&self, day: &str) -> FirstCloseStats {
        match self.query_stats(day) {
            Ok(stats) => stats,
            Err(err) => {
                debug!(error = %err, path = %self.path.display(), "first-close stats degraded to zeros");
                FirstCloseStats::default()
            }
        }
    }

    fn query_stats(&self, day: &str) -> Result<FirstCloseStats> {
        let conn = self.open()?;
        let today_rows = conn.query_row(
            "SELECT COUNT(1) FROM first_closes WHERE day = ?1",
            [day],
            |row| row.get(0),
        )?;
        let history_rows = conn.query_row(
            "SELECT COUNT(1) FROM first_closes WHERE day <> ?1",
            [day],
            |row| row.get(0),
        )?;
        let pending_symbols = conn.query_row(
            "SELECT COUNT(1) FROM history_state WHERE done = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(FirstCloseStats {
            today_rows,
            history_rows,
            pending_symbols,
        })
    }
}
