//! Query/View Layer
//!
//! Assembles the dashboard and trades views from the snapshot cache,
//! the derived cache, the paper store and the first-close stats.
//! Subsystem failures degrade to empty/zero sections; only the store
//! itself can error a view.

use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;

use super::types::*;
use super::AppState;
use crate::market_time::{self, MarketTimeStatus};
use crate::persistence::{PaperTrade, TradeStatus};
use crate::types::{BaseRow, FactorKind, Timeframe};

/// Entries kept in each analysis leaderboard
const ANALYSIS_TOP_N: usize = 10;

pub fn dashboard_view(state: &AppState, query: &DashboardQuery) -> Result<DashboardResponse> {
    let (snapshot, version, _) = state.snapshots.refresh();

    let tf = query
        .tf
        .as_deref()
        .and_then(Timeframe::parse)
        .unwrap_or_else(|| state.config.paper.timeframe());
    let factor = query
        .factor
        .as_deref()
        .and_then(FactorKind::parse)
        .unwrap_or_else(|| state.config.paper.factor_kind());
    let trigger_only = flag(&query.trigger_only, true);
    let complete_only = flag(&query.complete, false);
    let limit = query
        .limit
        .unwrap_or(DASHBOARD_LIMIT_DEFAULT)
        .clamp(1, DASHBOARD_LIMIT_MAX);
    let needle = query
        .q
        .as_deref()
        .unwrap_or("")
        .trim()
        .to_uppercase();

    let derived = state.analytics.derived(
        &snapshot,
        version,
        tf,
        factor,
        Utc::now().timestamp(),
    );
    let pool = if trigger_only {
        &derived.trigger_rows
    } else {
        &derived.all_rows
    };

    let mut matched = 0usize;
    let mut rows = Vec::new();
    for row in pool {
        if complete_only && !row.fetch_done {
            continue;
        }
        if !needle.is_empty()
            && !row.symbol.to_uppercase().starts_with(&needle)
            && !row.tsym.to_uppercase().starts_with(&needle)
        {
            continue;
        }
        matched += 1;
        if rows.len() < limit {
            rows.push(row.clone());
        }
    }

    let day = if snapshot.day == "-" {
        market_time::ist_day()
    } else {
        snapshot.day.clone()
    };
    let (snapshot_file_bytes, snapshot_file_mtime) = state.snapshots.file_info();
    let stats = StatsBlock {
        first_close: state.firstclose.stats(&day),
        symbol_cache_size: snapshot.rows.len(),
        snapshot_file_bytes,
        snapshot_file_mtime,
    };

    let broker_limits = state.engine.governor().report(&state.store, &day);
    let paper = &state.config.paper;
    let status = StatusBlock {
        producer: snapshot.status.clone(),
        broker_limits,
        market_time: MarketTimeStatus::current(),
        paper: PaperStatusBlock {
            trade_mode: paper.effective_trade_mode().to_string(),
            live_enabled: paper.live_enabled(),
            tf: paper.tf.clone(),
            factor: paper.factor.clone(),
            cycle_ms: paper.cycle_ms_clamped(),
            cooldown_sec: paper.cooldown_sec,
            jackpot_only: paper.jackpot_only,
        },
    };

    Ok(DashboardResponse {
        day: snapshot.day.clone(),
        updated_at: snapshot.updated_at.clone(),
        row_count: snapshot.row_count,
        tf: tf.to_string(),
        factor: factor.to_string(),
        trigger_only,
        complete_only,
        q: needle,
        limit,
        scanned: pool.len(),
        matched,
        returned: rows.len(),
        rows,
        stats,
        status,
    })
}

pub fn trades_view(state: &AppState, query: &TradesQuery) -> Result<TradesResponse> {
    let (snapshot, _, _) = state.snapshots.refresh();
    let by_symbol: HashMap<&str, &BaseRow> = snapshot
        .rows
        .iter()
        .map(|r| (r.symbol.as_str(), r))
        .collect();

    let open_limit = query
        .open_limit
        .unwrap_or(OPEN_LIMIT_DEFAULT)
        .clamp(1, OPEN_LIMIT_MAX);
    let closed_limit = query
        .closed_limit
        .unwrap_or(CLOSED_LIMIT_DEFAULT)
        .clamp(1, CLOSED_LIMIT_MAX);
    let needle = query.q.as_deref().unwrap_or("").trim().to_uppercase();
    let matches = |t: &PaperTrade| {
        needle.is_empty()
            || t.symbol.to_uppercase().starts_with(&needle)
            || t.tsym.to_uppercase().starts_with(&needle)
    };

    let all = state.store.all_trades()?;
    let summary = summarize(&all);

    let open: Vec<EnrichedTrade> = state
        .store
        .open_trades_recent_first(open_limit)?
        .into_iter()
        .filter(|t| matches(t))
        .map(|t| enrich(t, &by_symbol))
        .collect();
    let closed: Vec<EnrichedTrade> = state
        .store
        .closed_trades_recent_first(closed_limit)?
        .into_iter()
        .filter(|t| matches(t))
        .map(|t| enrich(t, &by_symbol))
        .collect();

    let timeframe = state.config.paper.timeframe();
    let analysis = build_analysis(&all, &snapshot.rows, timeframe);

    Ok(TradesResponse {
        summary,
        open,
        closed,
        analysis,
    })
}

fn summarize(all: &[PaperTrade]) -> TradeSummary {
    let mut summary = TradeSummary {
        total_trades: all.len(),
        ..Default::default()
    };
    for trade in all {
        match trade.status {
            TradeStatus::Open => summary.open_count += 1,
            TradeStatus::Closed => {
                summary.closed_count += 1;
                if trade.net_pnl >= 0.0 {
                    summary.wins += 1;
                } else {
                    summary.losses += 1;
                }
            }
        }
        summary.total_pnl += trade.pnl;
        summary.total_charges += trade.total_charges;
        summary.total_net_pnl += trade.net_pnl;
    }
    if summary.closed_count > 0 {
        summary.win_rate_pct = summary.wins as f64 / summary.closed_count as f64 * 100.0;
    }
    summary
}

fn enrich(trade: PaperTrade, by_symbol: &HashMap<&str, &BaseRow>) -> EnrichedTrade {
    let row = by_symbol.get(trade.symbol.as_str());
    EnrichedTrade {
        current_ltp: row.and_then(|r| r.ltp),
        current_volume: row.and_then(|r| r.volume),
        current_updated_at: row.and_then(|r| r.updated_at.clone()),
        trade,
    }
}

fn build_analysis(
    all: &[PaperTrade],
    snapshot_rows: &[BaseRow],
    timeframe: Timeframe,
) -> AnalysisBlock {
    // Winners/losers over open + closed, by pnl
    let mut by_pnl: Vec<&PaperTrade> = all.iter().collect();
    by_pnl.sort_by(|a, b| b.pnl.total_cmp(&a.pnl));
    let top_winners = by_pnl
        .iter()
        .filter(|t| t.pnl > 0.0)
        .take(ANALYSIS_TOP_N)
        .map(|t| brief(t))
        .collect();
    let top_losers = by_pnl
        .iter()
        .rev()
        .filter(|t| t.pnl < 0.0)
        .take(ANALYSIS_TOP_N)
        .map(|t| brief(t))
        .collect();

    // Per-symbol aggregates
    let mut per_symbol_map: HashMap<&str, SymbolPerformance> = HashMap::new();
    for trade in all {
        let entry = per_symbol_map
            .entry(trade.symbol.as_str())
            .or_insert_with(|| SymbolPerformance {
                symbol: trade.symbol.clone(),
                ..Default::default()
            });
        entry.trades += 1;
        entry.pnl += trade.pnl;
        entry.net_pnl += trade.net_pnl;
        if trade.status == TradeStatus::Closed {
            if trade.net_pnl >= 0.0 {
                entry.wins += 1;
            } else {
                entry.losses += 1;
            }
        }
    }
    let mut per_symbol: Vec<SymbolPerformance> = per_symbol_map.into_values().collect();
    per_symbol.sort_by(|a, b| b.pnl.total_cmp(&a.pnl));

    // Snapshot-wide movers
    let mut volume_leaders: Vec<VolumeLeader> = snapshot_rows
        .iter()
        .filter_map(|r| {
            Some(VolumeLeader {
                symbol: r.symbol.clone(),
                tsym: r.tsym.clone().unwrap_or_default(),
                volume: r.volume?,
            })
        })
        .collect();
    volume_leaders.sort_by(|a, b| b.volume.total_cmp(&a.volume));
    volume_leaders.truncate(ANALYSIS_TOP_N);

    let mut movers: Vec<MoverRow> = snapshot_rows
        .iter()
        .filter_map(|r| {
            let ltp = r.ltp?;
            let first_close = timeframe.first_close(r)?;
            if first_close <= 0.0 {
                return None;
            }
            Some(MoverRow {
                symbol: r.symbol.clone(),
                tsym: r.tsym.clone().unwrap_or_default(),
                ltp,
                first_close,
                change_pct: (ltp - first_close) / first_close * 100.0,
            })
        })
        .collect();
    movers.sort_by(|a, b| b.change_pct.total_cmp(&a.change_pct));
    let top_gainers = movers.iter().take(ANALYSIS_TOP_N).cloned().collect();
    let top_losers_pct = movers
        .iter()
        .rev()
        .filter(|m| m.change_pct < 0.0)
        .take(ANALYSIS_TOP_N)
        .cloned()
        .collect();

    AnalysisBlock {
        top_winners,
        top_losers,
        per_symbol,
        volume_leaders,
        top_gainers,
        top_losers_pct,
    }
}

fn brief(trade: &PaperTrade) -> TradeBrief {
    TradeBrief {
        symbol: trade.symbol.clone(),
        tsym: trade.tsym.clone(),
        status: trade.status.to_string(),
        reason: trade.reason.clone(),
        pnl: trade.pnl,
        net_pnl: trade.net_pnl,
    }
}
