//! Dashboard API Types
//!
//! Query parameters and response DTOs for the HTTP surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::DerivedRow;
use crate::firstclose::FirstCloseStats;
use crate::market_time::MarketTimeStatus;
use crate::persistence::PaperTrade;
use crate::risk::BrokerLimitsReport;

// ─────────────────────────────────────────────────────────────────
// Query parameters
// ─────────────────────────────────────────────────────────────────

pub const DASHBOARD_LIMIT_DEFAULT: usize = 5_000;
pub const DASHBOARD_LIMIT_MAX: usize = 50_000;
pub const OPEN_LIMIT_DEFAULT: usize = 500;
pub const OPEN_LIMIT_MAX: usize = 5_000;
pub const CLOSED_LIMIT_DEFAULT: usize = 1_000;
pub const CLOSED_LIMIT_MAX: usize = 10_000;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardQuery {
    pub tf: Option<String>,
    pub factor: Option<String>,
    /// "0"/"false" disables; anything else (and absence) enables
    pub trigger_only: Option<String>,
    /// "1"/"true" restricts to fetch_done rows
    pub complete: Option<String>,
    /// Case-insensitive symbol/tsym prefix
    pub q: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TradesQuery {
    pub open_limit: Option<usize>,
    pub closed_limit: Option<usize>,
    pub q: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

/// Loose flag parsing for "0|1|true|false" query params
pub fn flag(value: &Option<String>, default: bool) -> bool {
    match value.as_deref().map(str::trim) {
        None | Some("") => default,
        Some(v) => !matches!(v.to_lowercase().as_str(), "0" | "false" | "no" | "off"),
    }
}

// ─────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub trade_mode: String,
    pub live_enabled: bool,
    pub ist_time: String,
    pub ist_datetime: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardResponse {
    pub day: String,
    pub updated_at: String,
    pub row_count: u64,
    pub tf: String,
    pub factor: String,
    pub trigger_only: bool,
    pub complete_only: bool,
    pub q: String,
    pub limit: usize,
    /// Rows scanned before filtering (the configuration's output)
    pub scanned: usize,
    /// Rows matching the filters, pre-cap
    pub matched: usize,
    pub returned: usize,
    pub rows: Vec<DerivedRow>,
    pub stats: StatsBlock,
    pub status: StatusBlock,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsBlock {
    pub first_close: FirstCloseStats,
    /// Instruments in the current snapshot
    pub symbol_cache_size: usize,
    pub snapshot_file_bytes: u64,
    pub snapshot_file_mtime: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusBlock {
    /// Producer status passthrough from the snapshot file
    pub producer: Value,
    pub broker_limits: BrokerLimitsReport,
    pub market_time: MarketTimeStatus,
    pub paper: PaperStatusBlock,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaperStatusBlock {
    pub trade_mode: String,
    pub live_enabled: bool,
    pub tf: String,
    pub factor: String,
    pub cycle_ms: u64,
    pub cooldown_sec: u64,
    pub jackpot_only: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradesResponse {
    pub summary: TradeSummary,
    pub open: Vec<EnrichedTrade>,
    pub closed: Vec<EnrichedTrade>,
    pub analysis: AnalysisBlock,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TradeSummary {
    pub total_trades: usize,
    pub open_count: usize,
    pub closed_count: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate_pct: f64,
    pub total_pnl: f64,
    pub total_charges: f64,
    pub total_net_pnl: f64,
}

/// A stored trade plus the instrument's current snapshot fields
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedTrade {
    #[serde(flatten)]
    pub trade: PaperTrade,
    pub current_ltp: Option<f64>,
    pub current_volume: Option<f64>,
    pub current_updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisBlock {
    pub top_winners: Vec<TradeBrief>,
    pub top_losers: Vec<TradeBrief>,
    pub per_symbol: Vec<SymbolPerformance>,
    pub volume_leaders: Vec<VolumeLeader>,
    pub top_gainers: Vec<MoverRow>,
    pub top_losers_pct: Vec<MoverRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeBrief {
    pub symbol: String,
    pub tsym: String,
    pub status: String,
    pub reason: String,
    pub pnl: f64,
    pub net_pnl: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SymbolPerformance {
    pub symbol: String,
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub pnl: f64,
    pub net_pnl: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeLeader {
    pub symbol: String,
    pub tsym: String,
    pub volume: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoverRow {
    pub symbol: String,
    pub tsym: String,
    pub ltp: f64,
    pub first_close: f64,
    pub change_pct: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_parsing_defaults_and_negations() {
        assert!(flag(&None, true));
        assert!(!flag(&None, false));
        assert!(!flag(&Some("0".to_string()), true));
        assert!(!flag(&Some("false".to_string()), true));
        assert!(flag(&Some("1".to_string()), false));
        assert!(flag(&Some("yes".to_string()), false));
        assert!(flag(&Some("".to_string()), true));
    }
}
