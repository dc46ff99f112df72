//! Dashboard Module
//!
//! Shared application state plus the HTTP/JSON view surface over the
//! snapshot cache, derived-row engine, paper store and broker limits.

mod api;
pub mod types;
pub mod views;

pub use api::create_router;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::engine::Analytics;
use crate::firstclose::FirstCloseReader;
use crate::paper::PaperEngine;
use crate::persistence::TradeStore;
use crate::snapshot::SnapshotCache;

/// Everything a view handler needs; the engine task shares the same
/// underlying caches and store.
pub struct AppState {
    pub config: AppConfig,
    pub snapshots: Arc<SnapshotCache>,
    pub analytics: Arc<Analytics>,
    pub store: Arc<TradeStore>,
    pub firstclose: Arc<FirstCloseReader>,
    pub engine: Arc<PaperEngine>,
}
