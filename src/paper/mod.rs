//! Paper Trading Engine
//!
//! Simulated long-only execution over the live (timeframe, factor)
//! configuration's trigger rows. Lifecycle per symbol:
//! NONE -> OPEN -> CLOSED, driven by snapshot-version changes.
//!
//! Each cycle first updates every OPEN trade (running metrics, the
//! trailing-stop ladder, exit evaluation) and only then considers new
//! entries, so a symbol closing on version V cannot re-enter on the
//! same version; the per-symbol cooldown holds it out until it
//! re-qualifies on a later snapshot.

pub mod charges;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{NaiveTime, Timelike, Utc};
use tracing::{debug, info};

use crate::config::{AppConfig, PaperConfig};
use crate::engine::{Analytics, DerivedRow};
use crate::market_time;
use crate::persistence::{PaperTrade, TradeStatus, TradeStore};
use crate::risk::BrokerGovernor;
use crate::snapshot::{SnapshotCache, SnapshotVersion};
use crate::types::{InstrumentType, Trend};

/// Default reason recorded on accepted entries
pub const ENTRY_REASON: &str = "be5_reversal_guard_entry";

/// MCX evening session probability-score floor
const MCX_EVENING_MIN_SCORE: i64 = 25;

/// Quantity policy: options trade a lot, everything else a unit
const OPTION_QUANTITY: f64 = 50.0;

/// Exit reasons, first match wins in [`PaperEngine::manage_trade`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    MarketCloseAuto,
    TargetBu5,
    TrailingSl,
    SlBelowBu1,
    SpikeProtection,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::MarketCloseAuto => write!(f, "market_close_auto"),
            CloseReason::TargetBu5 => write!(f, "target_bu5"),
            CloseReason::TrailingSl => write!(f, "trailing_sl"),
            CloseReason::SlBelowBu1 => write!(f, "sl_below_bu1"),
            CloseReason::SpikeProtection => write!(f, "spike_protection"),
        }
    }
}

/// What one engine cycle did
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleOutcome {
    pub ran: bool,
    pub version: SnapshotVersion,
    pub opened: usize,
    pub closed: usize,
}

pub struct PaperEngine {
    paper: PaperConfig,
    governor: BrokerGovernor,
    store: Arc<TradeStore>,
    analytics: Arc<Analytics>,
    snapshots: Arc<SnapshotCache>,
    last_version: Mutex<SnapshotVersion>,
    /// Last close wall-clock per symbol (ms); lazily seeded from the
    /// store so cooldowns survive restarts
    cooldowns: Mutex<HashMap<String, i64>>,
}

impl PaperEngine {
    pub fn new(
        config: &AppConfig,
        store: Arc<TradeStore>,
        analytics: Arc<Analytics>,
        snapshots: Arc<SnapshotCache>,
    ) -> Self {
        Self {
            paper: config.paper.clone(),
            governor: BrokerGovernor::new(config.limits.clone()),
            store,
            analytics,
            snapshots,
            last_version: Mutex::new(0),
            cooldowns: Mutex::new(HashMap::new()),
        }
    }

    pub fn governor(&self) -> &BrokerGovernor {
        &self.governor
    }

    /// One engine cycle at the current IST clock
    pub fn cycle(&self) -> Result<CycleOutcome> {
        self.cycle_at(
            market_time::ist_now().time(),
            Utc::now().timestamp_millis(),
        )
    }

    /// One engine cycle at an explicit IST time-of-day and wall clock.
    /// No-ops unless the snapshot version advanced since the last run.
    pub fn cycle_at(&self, ist_tod: NaiveTime, now_ms: i64) -> Result<CycleOutcome> {
        let (snapshot, version, _) = self.snapshots.refresh();
        {
            let last = self.last_version.lock().expect("paper engine poisoned");
            if version == *last {
                return Ok(CycleOutcome {
                    ran: false,
                    version,
                    ..Default::default()
                });
            }
        }

        let day = market_time::ist_day();
        let derived = self.analytics.derived(
            &snapshot,
            version,
            self.paper.timeframe(),
            self.paper.factor_kind(),
            now_ms / 1000,
        );
        let rows_by_symbol: HashMap<&str, &DerivedRow> = derived
            .all_rows
            .iter()
            .map(|r| (r.symbol.as_str(), r))
            .collect();

        // Phase 1: update opens (metrics, TSL ladder, exits)
        let mut closed = 0usize;
        for trade in self.store.open_trades()? {
            let row = rows_by_symbol.get(trade.symbol.as_str()).copied();
            if self.manage_trade(trade, row, ist_tod, now_ms)? {
                closed += 1;
            }
        }

        // Phase 2: consider entries from the trigger subset
        let mut opened = 0usize;
        for row in &derived.trigger_rows {
            if self.try_enter(row, &day, ist_tod, now_ms)? {
                opened += 1;
            }
        }

        self.store.sync_broker_usage(&day, now_ms)?;
        *self.last_version.lock().expect("paper engine poisoned") = version;

        Ok(CycleOutcome {
            ran: true,
            version,
            opened,
            closed,
        })
    }

    // ── entries ─────────────────────────────────────────────────

    /// Entry filter + guard; inserts the OPEN trade when accepted
    fn try_enter(
        &self,
        row: &DerivedRow,
        day: &str,
        ist_tod: NaiveTime,
        now_ms: i64,
    ) -> Result<bool> {
        // 1. one OPEN per symbol, cooldown elapsed
        if self.store.has_open_trade(&row.symbol)? {
            return Ok(false);
        }
        if !self.cooldown_elapsed(&row.symbol, now_ms)? {
            return Ok(false);
        }

        // 2. row quality
        if !row.fetch_done || !row.in_range_up || row.sideways {
            return Ok(false);
        }
        if self.paper.trend_only && row.trend != Trend::Up {
            return Ok(false);
        }

        // 3..5. strength thresholds
        if row.confirmation < self.paper.min_confirmation {
            return Ok(false);
        }
        if row.rr_to_bu5 < self.paper.min_rr {
            return Ok(false);
        }
        let exchange = row.exchange.to_uppercase();
        let min_score = if exchange == "MCX" && market_time::mcx_evening_session_at(ist_tod.hour())
        {
            MCX_EVENING_MIN_SCORE
        } else {
            self.paper.min_probability_score
        };
        if row.probability_score < min_score {
            return Ok(false);
        }

        // 6..7. spike and jackpot gates
        if row.spike_flag {
            return Ok(false);
        }
        if self.paper.jackpot_only && !row.jackpot_be5_reversal {
            return Ok(false);
        }

        // 8. market open for this exchange
        if market_time::should_auto_close_at(&exchange, ist_tod) {
            return Ok(false);
        }

        // 9. broker-limits governor
        let report = self.governor.report(&self.store, day);
        if !report.safe_to_trade {
            debug!(symbol = %row.symbol, status = %report.status, "entry blocked by broker limits");
            return Ok(false);
        }

        // Entry guard, re-checked after selection
        if row.points <= 0.0 || row.bu1 <= 0.0 || row.bu5 <= 0.0 {
            debug!(symbol = %row.symbol, reason = "missing_levels", "entry rejected");
            return Ok(false);
        }
        if row.ltp < row.bu1 || row.ltp > row.bu5 {
            debug!(symbol = %row.symbol, reason = "outside_bu1_bu5", "entry rejected");
            return Ok(false);
        }

        let quantity = if row.instrument_type == InstrumentType::Option {
            OPTION_QUANTITY
        } else {
            1.0
        };
        let mut trade = PaperTrade {
            id: 0,
            symbol: row.symbol.clone(),
            tsym: row.tsym.clone(),
            exchange: row.exchange.clone(),
            day: day.to_string(),
            timeframe: self.paper.timeframe().to_string(),
            factor: row.factor,
            instrument_type: row.instrument_type.to_string(),
            close_price: row.close,
            points: row.points,
            bu1: row.bu1,
            bu2: row.bu2,
            bu3: row.bu3,
            bu4: row.bu4,
            bu5: row.bu5,
            be1: row.be1,
            be2: row.be2,
            be3: row.be3,
            be4: row.be4,
            be5: row.be5,
            sl_price: row.be1,
            tp_price: row.bu5,
            tsl_trigger: row.bu3,
            tsl_active: false,
            tsl_sl_price: row.be1,
            entry_ltp: row.ltp,
            entry_ts: now_ms,
            exit_ltp: None,
            exit_ts: None,
            quantity,
            reason: ENTRY_REASON.to_string(),
            last_ltp: row.ltp,
            max_ltp: row.ltp,
            min_ltp: row.ltp,
            runup: 0.0,
            drawdown: 0.0,
            max_profit_points: 0.0,
            pnl: 0.0,
            pnl_pct: 0.0,
            brokerage: 0.0,
            stt: 0.0,
            exchange_charges: 0.0,
            sebi_charges: 0.0,
            stamp_duty: 0.0,
            gst: 0.0,
            total_charges: 0.0,
            net_pnl: 0.0,
            status: TradeStatus::Open,
            updated_at: now_ms,
        };
        trade.id = self.store.insert_trade(&trade)?;
        self.store.record_order(day, now_ms)?;
        info!(
            symbol = %trade.symbol,
            entry = trade.entry_ltp,
            sl = trade.sl_price,
            tp = trade.tp_price,
            qty = trade.quantity,
            "paper entry"
        );
        Ok(true)
    }

    fn cooldown_elapsed(&self, symbol: &str, now_ms: i64) -> Result<bool> {
        let mut cooldowns = self.cooldowns.lock().expect("paper engine poisoned");
        let last_close = match cooldowns.get(symbol) {
            Some(&ts) => ts,
            None => {
                let ts = self.store.last_close_ts(symbol)?.unwrap_or(0);
                cooldowns.insert(symbol.to_string(), ts);
                ts
            }
        };
        Ok(now_ms - last_close >= (self.paper.cooldown_sec as i64) * 1000)
    }

    // ── management ──────────────────────────────────────────────

    /// Metrics + TSL ladder + exit evaluation for one OPEN trade.
    /// Returns true when the trade closed this pass.
    fn manage_trade(
        &self,
        mut trade: PaperTrade,
        row: Option<&DerivedRow>,
        ist_tod: NaiveTime,
        now_ms: i64,
    ) -> Result<bool> {
        if let Some(row) = row {
            let ltp = row.ltp;
            trade.last_ltp = ltp;
            trade.max_ltp = trade.max_ltp.max(ltp);
            trade.min_ltp = trade.min_ltp.min(ltp);
            trade.runup = trade.runup.max(ltp - trade.entry_ltp);
            trade.drawdown = trade.drawdown.max(trade.entry_ltp - ltp);
            trade.max_profit_points = trade
                .max_profit_points
                .max(trade.max_ltp - trade.entry_ltp);
            trade.pnl = (ltp - trade.entry_ltp) * trade.quantity;
            trade.pnl_pct = (ltp - trade.entry_ltp) / trade.entry_ltp * 100.0;

            // Trailing-stop ladder; activation is one-way
            if !trade.tsl_active && ltp >= trade.tsl_trigger {
                trade.tsl_active = true;
                trade.tsl_sl_price = trade.be1;
            }
            if trade.tsl_active && ltp >= trade.bu4 && trade.tsl_sl_price < trade.bu1 {
                trade.tsl_sl_price = trade.bu1;
            }
            if trade.tsl_active && ltp >= trade.bu5 && trade.tsl_sl_price < trade.bu2 {
                trade.tsl_sl_price = trade.bu2;
            }
        }

        // Exit evaluation, first match wins
        let exit = if market_time::should_auto_close_at(&trade.exchange.to_uppercase(), ist_tod) {
            Some(CloseReason::MarketCloseAuto)
        } else if let Some(row) = row {
            let ltp = row.ltp;
            let stop = if trade.tsl_active {
                trade.tsl_sl_price
            } else {
                trade.bu1
            };
            if ltp >= trade.bu5 {
                Some(CloseReason::TargetBu5)
            } else if ltp < stop {
                if trade.tsl_active {
                    Some(CloseReason::TrailingSl)
                } else {
                    Some(CloseReason::SlBelowBu1)
                }
            } else if row.spike_flag && ltp < trade.entry_ltp {
                Some(CloseReason::SpikeProtection)
            } else {
                None
            }
        } else {
            None
        };

        match exit {
            Some(reason) => {
                let exit_ltp = row.map(|r| r.ltp).unwrap_or(trade.last_ltp);
                self.close_trade(&mut trade, exit_ltp, reason, now_ms)?;
                Ok(true)
            }
            None => {
                trade.updated_at = now_ms;
                self.store.update_trade(&trade)?;
                Ok(false)
            }
        }
    }

    /// Terminal transition: charges, P&L, cooldown start
    fn close_trade(
        &self,
        trade: &mut PaperTrade,
        exit_ltp: f64,
        reason: CloseReason,
        now_ms: i64,
    ) -> Result<()> {
        let breakdown = charges::compute_charges(
            trade.entry_ltp,
            exit_ltp,
            trade.quantity,
            &trade.exchange.to_uppercase(),
        );
        trade.status = TradeStatus::Closed;
        trade.exit_ltp = Some(exit_ltp);
        trade.exit_ts = Some(now_ms);
        trade.reason = reason.to_string();
        trade.last_ltp = exit_ltp;
        trade.pnl = (exit_ltp - trade.entry_ltp) * trade.quantity;
        trade.pnl_pct = (exit_ltp - trade.entry_ltp) / trade.entry_ltp * 100.0;
        trade.brokerage = breakdown.brokerage;
        trade.stt = breakdown.stt;
        trade.exchange_charges = breakdown.exchange_charges;
        trade.sebi_charges = breakdown.sebi_charges;
        trade.stamp_duty = breakdown.stamp_duty;
        trade.gst = breakdown.gst;
        trade.total_charges = breakdown.total;
        trade.net_pnl = trade.pnl - breakdown.total;
        trade.updated_at = now_ms;
        self.store.update_trade(trade)?;

        self.cooldowns
            .lock()
            .expect("paper engine poisoned")
            .insert(trade.symbol.clone(), now_ms);

        info!(
            symbol = %trade.symbol,
            reason = %reason,
            exit = exit_ltp,
            pnl = trade.pnl,
            net = trade.net_pnl,
            "paper exit"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrokerLimitsConfig, DataConfig, ServerConfig};
    use crate::engine::EngineParams;
    use crate::types::Snapshot;
    use std::fs;
    use std::path::Path;

    fn tod(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    fn config(dir: &Path, min_probability_score: i64) -> AppConfig {
        AppConfig {
            server: ServerConfig { port: 0 },
            data: DataConfig {
                data_dir: dir.display().to_string(),
                snapshot_file: dir.join("ui_snapshot.json").display().to_string(),
                first_close_db: dir.join("history.db").display().to_string(),
                paper_db: dir.join("paper_trades.db").display().to_string(),
                exports_dir: dir.join("exports").display().to_string(),
            },
            paper: PaperConfig {
                tf: "5m".to_string(),
                factor: "micro".to_string(),
                factor_mcx: "mini".to_string(),
                cooldown_sec: 30,
                cycle_ms: 1500,
                trade_mode: "paper".to_string(),
                enable_live_trading: false,
                trend_only: true,
                min_confirmation: 2,
                min_rr: 0.5,
                jackpot_only: false,
                jackpot_touch_lookback_sec: 1800,
                jackpot_min_confirmation: None,
                jackpot_min_rr: None,
                min_volume_accel: 1.15,
                min_probability_score,
                max_spike_points_mult: 2.5,
            },
            limits: BrokerLimitsConfig {
                max_orders_per_day: 2000,
                max_open_positions: 100,
                max_margin_used_pct: 80.0,
            },
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        snapshot_path: std::path::PathBuf,
        engine: PaperEngine,
        store: Arc<TradeStore>,
        writes: u64,
    }

    impl Harness {
        /// `relaxed` drops the probability-score gate so lifecycle
        /// tests can steer ltp freely; scoring itself is covered by
        /// the engine tests.
        fn new(relaxed: bool) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let cfg = config(dir.path(), if relaxed { 0 } else { 35 });
            let store = Arc::new(TradeStore::open(&cfg.data.paper_db).unwrap());
            let analytics = Arc::new(Analytics::new(EngineParams::from_config(&cfg.paper)));
            let snapshots = Arc::new(SnapshotCache::new(&cfg.data.snapshot_file));
            let engine =
                PaperEngine::new(&cfg, Arc::clone(&store), analytics, Arc::clone(&snapshots));
            Self {
                snapshot_path: dir.path().join("ui_snapshot.json"),
                _dir: dir,
                engine,
                store,
                writes: 0,
            }
        }

        /// Write a snapshot and force a fresh mtime so every publish
        /// is a new version
        fn publish(&mut self, rows: &[(&str, f64, f64)]) {
            let rows = rows
                .iter()
                .map(|(symbol, ltp, volume)| {
                    serde_json::from_value(serde_json::json!({
                        "symbol": symbol,
                        "tsym": symbol.replace('|', "_"),
                        "exchange": "NSE",
                        "ltp": ltp,
                        "volume": volume,
                        "first_5m_close": 100.0,
                        "fetch_done": true
                    }))
                    .unwrap()
                })
                .collect::<Vec<_>>();
            let snap = Snapshot {
                day: "2026-08-02".to_string(),
                updated_at: "2026-08-02T11:00:00".to_string(),
                row_count: rows.len() as u64,
                rows,
                status: serde_json::Value::Null,
            };
            fs::write(&self.snapshot_path, serde_json::to_vec(&snap).unwrap()).unwrap();
            self.writes += 1;
            let mtime = std::time::UNIX_EPOCH
                + std::time::Duration::from_secs(1_700_000_000 + self.writes);
            fs::OpenOptions::new()
                .write(true)
                .open(&self.snapshot_path)
                .unwrap()
                .set_modified(mtime)
                .unwrap();
        }
    }

    #[test]
    fn cycle_noops_without_a_new_version() {
        let mut h = Harness::new(true);
        h.publish(&[("NSE|22", 100.10, 1000.0)]);

        let out = h.engine.cycle_at(tod(11, 0, 0), 1_000_000).unwrap();
        assert!(out.ran);
        let out = h.engine.cycle_at(tod(11, 0, 2), 1_002_000).unwrap();
        assert!(!out.ran);
    }

    #[test]
    fn entry_accepted_with_strong_row() {
        // Strict scoring: confirmation 1 is rejected, a confirmed
        // break with healthy R:R and volume flow is accepted.
        let mut h = Harness::new(false);
        h.publish(&[("NSE|22", 100.30, 1000.0)]);
        let out = h.engine.cycle_at(tod(11, 0, 0), 1_000_000).unwrap();
        assert_eq!(out.opened, 0);

        h.publish(&[("NSE|22", 100.60, 2000.0)]);
        let out = h.engine.cycle_at(tod(11, 0, 2), 1_002_000).unwrap();
        assert_eq!(out.opened, 1);

        let open = h.store.open_trades().unwrap();
        assert_eq!(open.len(), 1);
        let t = &open[0];
        assert_eq!(t.entry_ltp, 100.60);
        assert!((t.sl_price - t.be1).abs() < 1e-9);
        assert!((t.tp_price - t.bu5).abs() < 1e-9);
        assert!((t.tsl_trigger - t.bu3).abs() < 1e-9);
        assert!(!t.tsl_active);
        assert!((t.tsl_sl_price - t.be1).abs() < 1e-9);
        assert_eq!(t.quantity, 1.0);
        assert_eq!(t.reason, ENTRY_REASON);
        assert_eq!(t.timeframe, "5m");

        // Same symbol cannot double-open on the next version
        h.publish(&[("NSE|22", 100.90, 3500.0)]);
        let out = h.engine.cycle_at(tod(11, 0, 4), 1_004_000).unwrap();
        assert_eq!(out.opened, 0);
        assert_eq!(h.store.open_trades().unwrap().len(), 1);
    }

    #[test]
    fn trailing_stop_activates_ratchets_and_exits() {
        let mut h = Harness::new(true);
        h.publish(&[("NSE|22", 100.30, 1000.0)]);
        h.engine.cycle_at(tod(11, 0, 0), 1_000_000).unwrap();
        h.publish(&[("NSE|22", 100.60, 2000.0)]);
        h.engine.cycle_at(tod(11, 0, 2), 1_002_000).unwrap();
        assert_eq!(h.store.open_trades().unwrap().len(), 1);

        // ltp crosses the BU3 trigger -> TSL arms at BE1
        h.publish(&[("NSE|22", 100.80, 2100.0)]);
        h.engine.cycle_at(tod(11, 0, 4), 1_004_000).unwrap();
        let t = &h.store.open_trades().unwrap()[0];
        assert!(t.tsl_active);
        assert!((t.tsl_sl_price - t.be1).abs() < 1e-9);

        // 101.04 < BU4 (101.0444): the ladder holds at BE1
        h.publish(&[("NSE|22", 101.04, 2200.0)]);
        h.engine.cycle_at(tod(11, 0, 6), 1_006_000).unwrap();
        let t = &h.store.open_trades().unwrap()[0];
        assert!((t.tsl_sl_price - t.be1).abs() < 1e-9);

        // 101.10 >= BU4: stop promotes to BU1, never back down
        h.publish(&[("NSE|22", 101.10, 2300.0)]);
        h.engine.cycle_at(tod(11, 0, 8), 1_008_000).unwrap();
        let t = &h.store.open_trades().unwrap()[0];
        assert!((t.tsl_sl_price - t.bu1).abs() < 1e-9);

        // 100.20 < stop: trailing exit
        h.publish(&[("NSE|22", 100.20, 2400.0)]);
        let out = h.engine.cycle_at(tod(11, 0, 10), 1_010_000).unwrap();
        assert_eq!(out.closed, 1);
        let t = &h.store.closed_trades_recent_first(1).unwrap()[0];
        assert_eq!(t.reason, "trailing_sl");
        assert_eq!(t.exit_ltp, Some(100.20));
        assert!(t.exit_ts.unwrap() >= t.entry_ts);
        assert!((t.net_pnl + t.total_charges - t.pnl).abs() < 1e-6);
    }

    #[test]
    fn cooldown_blocks_same_tick_and_early_reentry() {
        let mut h = Harness::new(true);
        h.publish(&[("NSE|22", 100.30, 1000.0)]);
        h.engine.cycle_at(tod(11, 0, 0), 1_000_000).unwrap();
        h.publish(&[("NSE|22", 100.60, 2000.0)]);
        h.engine.cycle_at(tod(11, 0, 2), 1_002_000).unwrap();
        assert_eq!(h.store.open_trades().unwrap().len(), 1);

        // Drop below BU1: closes; the close's own version cannot
        // re-enter (update-then-enter ordering + fresh cooldown)
        h.publish(&[("NSE|22", 100.20, 2100.0)]);
        let out = h.engine.cycle_at(tod(11, 0, 4), 1_004_000).unwrap();
        assert_eq!(out.closed, 1);
        assert_eq!(out.opened, 0);

        // A qualifying row 10 s after the close is still cooling down
        h.publish(&[("NSE|22", 100.70, 2200.0)]);
        let out = h.engine.cycle_at(tod(11, 0, 14), 1_014_000).unwrap();
        assert_eq!(out.opened, 0);

        // 36 s after the close the symbol trades again
        h.publish(&[("NSE|22", 100.72, 2300.0)]);
        let out = h.engine.cycle_at(tod(11, 0, 40), 1_040_000).unwrap();
        assert_eq!(out.opened, 1);
    }

    #[test]
    fn spike_blocks_fresh_entry() {
        let mut h = Harness::new(true);
        // Establish a prior ltp below the ladder
        h.publish(&[("NSE|22", 100.10, 1000.0)]);
        let out = h.engine.cycle_at(tod(11, 0, 0), 1_000_000).unwrap();
        assert_eq!(out.opened, 0); // sideways

        // 0.80 jump > 2.5 * 0.2611: spike, entry suppressed
        h.publish(&[("NSE|22", 100.90, 2000.0)]);
        let out = h.engine.cycle_at(tod(11, 0, 2), 1_002_000).unwrap();
        assert_eq!(out.opened, 0);

        // Calm follow-through is accepted
        h.publish(&[("NSE|22", 100.95, 2100.0)]);
        let out = h.engine.cycle_at(tod(11, 0, 4), 1_004_000).unwrap();
        assert_eq!(out.opened, 1);
    }

    #[test]
    fn crash_spike_below_entry_closes_position() {
        let mut h = Harness::new(true);
        h.publish(&[("NSE|22", 100.30, 1000.0)]);
        h.engine.cycle_at(tod(11, 0, 0), 1_000_000).unwrap();
        h.publish(&[("NSE|22", 100.60, 2000.0)]);
        h.engine.cycle_at(tod(11, 0, 2), 1_002_000).unwrap();
        assert_eq!(h.store.open_trades().unwrap().len(), 1);

        // Run up through BU3 so the TSL stop sits at BE1
        h.publish(&[("NSE|22", 101.04, 2100.0)]);
        let out = h.engine.cycle_at(tod(11, 0, 4), 1_004_000).unwrap();
        assert_eq!(out.closed, 0);

        // 101.04 -> 100.30: spike-sized crash, below entry but above
        // the BE1 stop -> spike protection
        h.publish(&[("NSE|22", 100.30, 2200.0)]);
        let out = h.engine.cycle_at(tod(11, 0, 6), 1_006_000).unwrap();
        assert_eq!(out.closed, 1);
        let t = &h.store.closed_trades_recent_first(1).unwrap()[0];
        assert_eq!(t.reason, "spike_protection");
        assert!(t.exit_ltp.unwrap() < t.entry_ltp);
    }

    #[test]
    fn market_close_forces_exit_and_blocks_entries() {
        let mut h = Harness::new(true);
        h.publish(&[("NSE|22", 100.30, 1000.0)]);
        h.engine.cycle_at(tod(15, 27, 0), 1_000_000).unwrap();
        h.publish(&[("NSE|22", 100.60, 2000.0)]);
        h.engine.cycle_at(tod(15, 27, 10), 1_002_000).unwrap();
        assert_eq!(h.store.open_trades().unwrap().len(), 1);

        // One second before the threshold the position survives
        h.publish(&[("NSE|22", 100.65, 2100.0)]);
        let out = h.engine.cycle_at(tod(15, 28, 29), 1_004_000).unwrap();
        assert_eq!(out.closed, 0);

        // Past 15:28:30 IST: forced close, no new entries
        h.publish(&[("NSE|22", 100.66, 2200.0)]);
        let out = h.engine.cycle_at(tod(15, 28, 31), 1_006_000).unwrap();
        assert_eq!(out.closed, 1);
        assert_eq!(out.opened, 0);
        let t = &h.store.closed_trades_recent_first(1).unwrap()[0];
        assert_eq!(t.reason, "market_close_auto");
        assert!(t.total_charges > 0.0);
        assert!((t.net_pnl + t.total_charges - t.pnl).abs() < 1e-6);
    }

    #[test]
    fn target_exit_at_bu5() {
        let mut h = Harness::new(true);
        h.publish(&[("NSE|22", 100.30, 1000.0)]);
        h.engine.cycle_at(tod(11, 0, 0), 1_000_000).unwrap();
        h.publish(&[("NSE|22", 100.60, 2000.0)]);
        h.engine.cycle_at(tod(11, 0, 2), 1_002_000).unwrap();

        // Walk up without tripping the spike guard, then tag BU5
        h.publish(&[("NSE|22", 101.10, 2100.0)]);
        h.engine.cycle_at(tod(11, 0, 4), 1_004_000).unwrap();
        h.publish(&[("NSE|22", 101.31, 2200.0)]);
        let out = h.engine.cycle_at(tod(11, 0, 6), 1_006_000).unwrap();
        assert_eq!(out.closed, 1);
        let t = &h.store.closed_trades_recent_first(1).unwrap()[0];
        assert_eq!(t.reason, "target_bu5");
        assert!(t.runup > 0.0);
        assert!(t.max_ltp >= t.last_ltp && t.last_ltp >= t.min_ltp);
        assert!(t.max_profit_points > 0.0);
    }

    #[test]
    fn broker_counters_advance_on_entry() {
        let mut h = Harness::new(true);
        h.publish(&[("NSE|22", 100.30, 1000.0)]);
        h.engine.cycle_at(tod(11, 0, 0), 1_000_000).unwrap();
        h.publish(&[("NSE|22", 100.60, 2000.0)]);
        h.engine.cycle_at(tod(11, 0, 2), 1_002_000).unwrap();

        let day = market_time::ist_day();
        let report = h.engine.governor().report(&h.store, &day);
        assert_eq!(report.orders_placed, 1);
        assert_eq!(report.open_positions, 1);
        assert!((report.margin_used - 100.60).abs() < 1e-6);
        assert!(report.safe_to_trade);
    }

    #[test]
    fn one_open_trade_per_symbol_across_many_rows() {
        let mut h = Harness::new(true);
        h.publish(&[("NSE|1", 100.30, 1000.0), ("NSE|2", 100.10, 1000.0)]);
        h.engine.cycle_at(tod(11, 0, 0), 1_000_000).unwrap();
        h.publish(&[("NSE|1", 100.60, 2000.0), ("NSE|2", 100.55, 2000.0)]);
        let out = h.engine.cycle_at(tod(11, 0, 2), 1_002_000).unwrap();
        assert_eq!(out.opened, 2);

        h.publish(&[("NSE|1", 100.62, 2100.0), ("NSE|2", 100.57, 2100.0)]);
        let out = h.engine.cycle_at(tod(11, 0, 4), 1_004_000).unwrap();
        assert_eq!(out.opened, 0);
        let open = h.store.open_trades().unwrap();
        assert_eq!(open.len(), 2);
        let symbols: std::collections::HashSet<&str> =
            open.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols.len(), 2);
    }
}
