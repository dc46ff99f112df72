//! Derived-Row Engine
//!
//! For a (timeframe, factor) configuration, enrich every base row that
//! passes the numeric guard into a derived row: level ladder, trend,
//! confirmation, R:R, volume acceleration, BE5-retest state, jackpot
//! flags, probability score, spike flag.
//!
//! Recomputation mutates the per-(config, symbol) signal state. The
//! prev* values a row sees are always those stored by the *prior*
//! recomputation; the current row's values are committed only after
//! its derived fields are fixed.

pub mod cache;
pub mod signal_state;

pub use cache::DerivedCache;
pub use signal_state::{ConfigKey, SignalState, SignalStateStore};

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;

use crate::config::PaperConfig;
use crate::levels::{resolve_factor, LevelLadder};
use crate::snapshot::SnapshotVersion;
use crate::types::{BaseRow, FactorKind, InstrumentType, Snapshot, Timeframe, Trend};

/// Denominator guard for R:R when ltp sits on BU1
const RR_EPSILON: f64 = 1e-4;

/// |near_pct| window for the simple BU1/BE1 retest flags
const RETEST_NEAR_PCT: f64 = 0.08;

/// Thresholds the engine reads from configuration
#[derive(Debug, Clone)]
pub struct EngineParams {
    pub mcx_factor: FactorKind,
    pub jackpot_touch_lookback_sec: i64,
    pub jackpot_min_confirmation: u32,
    pub jackpot_min_rr: f64,
    pub min_volume_accel: f64,
    pub max_spike_points_mult: f64,
}

impl EngineParams {
    pub fn from_config(paper: &PaperConfig) -> Self {
        Self {
            mcx_factor: paper.factor_mcx_kind(),
            jackpot_touch_lookback_sec: paper.jackpot_touch_lookback_sec,
            jackpot_min_confirmation: paper.jackpot_min_confirmation(),
            jackpot_min_rr: paper.jackpot_min_rr(),
            min_volume_accel: paper.min_volume_accel,
            max_spike_points_mult: paper.max_spike_points_mult,
        }
    }
}

/// One enriched instrument row for a (timeframe, factor) configuration
#[derive(Debug, Clone, Serialize)]
pub struct DerivedRow {
    pub symbol: String,
    pub tsym: String,
    pub exchange: String,
    pub token: String,
    pub instrument_type: InstrumentType,
    pub ltp: f64,
    pub volume: Option<f64>,
    pub fetch_done: bool,
    pub updated_at: Option<String>,
    pub close: f64,
    pub selected_factor: FactorKind,
    pub factor: f64,
    pub factor_reason: &'static str,
    pub points: f64,
    pub bu1: f64,
    pub bu2: f64,
    pub bu3: f64,
    pub bu4: f64,
    pub bu5: f64,
    pub be1: f64,
    pub be2: f64,
    pub be3: f64,
    pub be4: f64,
    pub be5: f64,
    pub near_name: &'static str,
    pub near_value: f64,
    pub near_diff: f64,
    pub near_pct: f64,
    pub in_range_up: bool,
    pub in_range_down: bool,
    pub sideways: bool,
    pub trend: Trend,
    pub up_break_count: u32,
    pub down_break_count: u32,
    pub confirmation: u32,
    pub rr_to_bu5: f64,
    pub volume_delta: f64,
    pub volume_accel: f64,
    pub be5_touched_recent: bool,
    pub jackpot_be5_reversal: bool,
    pub jackpot_retest: bool,
    pub jackpot_short: bool,
    pub spike_flag: bool,
    pub probability_score: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digit_analyses: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_digit: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_analysis: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gamma_move: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_shifts: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traderscope_ready: Option<Value>,
}

/// Engine output for one configuration: every validated row, plus the
/// entry-candidate subset. Both are sorted ascending by (symbol, tsym).
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub all_rows: Vec<DerivedRow>,
    pub trigger_rows: Vec<DerivedRow>,
}

/// Compute derived rows for one configuration, updating signal state.
///
/// Rows missing `ltp` or the timeframe's first close are excluded from
/// both outputs but keep their symbol's signal state alive. One linear
/// pass plus the final sort.
pub fn compute_rows(
    rows: &[BaseRow],
    timeframe: Timeframe,
    factor: FactorKind,
    params: &EngineParams,
    signals: &mut SignalStateStore,
    now_ts: i64,
) -> EngineOutput {
    let config: ConfigKey = (timeframe, factor);
    let mut seen: HashSet<String> = HashSet::with_capacity(rows.len());
    let mut all_rows: Vec<DerivedRow> = Vec::with_capacity(rows.len());

    for row in rows {
        seen.insert(row.symbol.clone());

        let Some(ltp) = row.ltp else { continue };
        let Some(close) = timeframe.first_close(row) else {
            continue;
        };
        if close <= 0.0 {
            continue;
        }

        let exchange = row.exchange_upper();
        let tsym = row.tsym_upper();
        let choice = resolve_factor(factor, params.mcx_factor, ltp, close, &exchange, &tsym);
        let ladder = LevelLadder::compute(close, choice.factor);
        let prior = signals.get(config, &row.symbol);

        // BE5 retest window
        let mut touch_ts = prior.be5_touch_ts;
        let mut min_ltp = prior.be5_min_ltp;
        let mut touch_volume = prior.be5_touch_volume;
        if ltp <= ladder.be5() {
            touch_ts = Some(now_ts);
            min_ltp = Some(min_ltp.map_or(ltp, |m| m.min(ltp)));
            if touch_volume.is_none() {
                touch_volume = row.volume;
            }
        }
        let be5_touched_recent =
            touch_ts.is_some_and(|ts| now_ts - ts <= params.jackpot_touch_lookback_sec);
        if !be5_touched_recent {
            touch_ts = None;
            min_ltp = None;
            touch_volume = None;
        }

        // Volume delta / acceleration against the prior recomputation
        let (volume_delta, volume_accel, next_prev_volume, next_prev_vol_delta) = match row.volume {
            Some(volume) => {
                let delta = prior.prev_volume.map_or(0.0, |pv| (volume - pv).max(0.0));
                let accel = if prior.prev_vol_delta > 0.0 {
                    delta / prior.prev_vol_delta
                } else if delta > 0.0 {
                    1.0
                } else {
                    0.0
                };
                (delta, accel, Some(volume), delta)
            }
            // No volume this tick: leave the stored baseline alone
            None => (0.0, 0.0, prior.prev_volume, prior.prev_vol_delta),
        };

        let trend = if ltp >= ladder.bu1() {
            Trend::Up
        } else if ltp <= ladder.be1() {
            Trend::Down
        } else {
            Trend::Sideways
        };
        let up_break_count = ladder.bu.iter().filter(|level| ltp >= **level).count() as u32;
        let down_break_count = ladder.be.iter().filter(|level| ltp <= **level).count() as u32;
        let confirmation = match trend {
            Trend::Up => up_break_count,
            Trend::Down => down_break_count,
            Trend::Sideways => 0,
        };

        let in_range_up = ladder.bu1() <= ltp && ltp <= ladder.bu5();
        let in_range_down = ladder.be5() <= ltp && ltp <= ladder.be1();
        let sideways = ladder.be1() < ltp && ltp < ladder.bu1();

        let rr_to_bu5 = (ladder.bu5() - ltp).max(0.0) / (ltp - ladder.bu1()).max(RR_EPSILON);

        let (near_name, near_value) = ladder.nearest(ltp);
        let near_diff = ltp - near_value;
        let near_pct = if near_value.abs() > f64::EPSILON {
            near_diff / near_value * 100.0
        } else {
            0.0
        };

        let just_crossed_bu1 =
            prior.prev_ltp.is_some_and(|p| p < ladder.bu1()) && ltp >= ladder.bu1();
        let jackpot_be5_reversal = be5_touched_recent
            && min_ltp.is_some_and(|m| m <= ladder.be5())
            && ltp >= ladder.bu1()
            && (just_crossed_bu1 || near_name == "BU1")
            && confirmation >= params.jackpot_min_confirmation
            && rr_to_bu5 >= params.jackpot_min_rr
            && volume_accel >= params.min_volume_accel;

        let jackpot_retest =
            trend == Trend::Up && near_name == "BU1" && near_pct.abs() <= RETEST_NEAR_PCT;
        let jackpot_short =
            trend == Trend::Down && near_name == "BE1" && near_pct.abs() <= RETEST_NEAR_PCT;

        let spike_flag = ladder.points > 0.0
            && prior
                .prev_ltp
                .is_some_and(|p| (ltp - p).abs() > ladder.points * params.max_spike_points_mult);

        let raw_score = 45.0 * (confirmation as f64).min(5.0) / 5.0
            + 35.0 * rr_to_bu5.min(5.0) / 5.0
            + 15.0 * volume_accel.min(3.0) / 3.0
            + if be5_touched_recent { 5.0 } else { 0.0 };
        let probability_score = (raw_score.round() as i64).clamp(0, 100);

        all_rows.push(DerivedRow {
            symbol: row.symbol.clone(),
            tsym: row.tsym.clone().unwrap_or_default(),
            exchange: row.exchange.clone().unwrap_or_default(),
            token: row.token.clone().unwrap_or_default(),
            instrument_type: crate::levels::detect_instrument_type(&exchange, &tsym),
            ltp,
            volume: row.volume,
            fetch_done: row.fetch_done,
            updated_at: row.updated_at.clone(),
            close,
            selected_factor: choice.kind,
            factor: choice.factor,
            factor_reason: choice.reason,
            points: ladder.points,
            bu1: ladder.bu[0],
            bu2: ladder.bu[1],
            bu3: ladder.bu[2],
            bu4: ladder.bu[3],
            bu5: ladder.bu[4],
            be1: ladder.be[0],
            be2: ladder.be[1],
            be3: ladder.be[2],
            be4: ladder.be[3],
            be5: ladder.be[4],
            near_name,
            near_value,
            near_diff,
            near_pct,
            in_range_up,
            in_range_down,
            sideways,
            trend,
            up_break_count,
            down_break_count,
            confirmation,
            rr_to_bu5,
            volume_delta,
            volume_accel,
            be5_touched_recent,
            jackpot_be5_reversal,
            jackpot_retest,
            jackpot_short,
            spike_flag,
            probability_score,
            digit_analyses: row.digit_analyses.clone(),
            selected_digit: row.selected_digit.clone(),
            selected_analysis: row.selected_analysis.clone(),
            gamma_move: row.gamma_move.clone(),
            range_shifts: row.range_shifts.clone(),
            traderscope_ready: row.traderscope_ready.clone(),
        });

        // Commit only now: this row's derived fields are final.
        signals.commit(
            config,
            &row.symbol,
            SignalState {
                prev_ltp: Some(ltp),
                prev_volume: next_prev_volume,
                prev_vol_delta: next_prev_vol_delta,
                be5_touch_ts: touch_ts,
                be5_min_ltp: min_ltp,
                be5_touch_volume: touch_volume,
            },
        );
    }

    signals.retain_symbols(config, &seen);

    all_rows.sort_by(|a, b| (a.symbol.as_str(), a.tsym.as_str()).cmp(&(b.symbol.as_str(), b.tsym.as_str())));
    let trigger_rows = all_rows
        .iter()
        .filter(|r| r.in_range_up && !r.sideways)
        .cloned()
        .collect();

    EngineOutput {
        all_rows,
        trigger_rows,
    }
}

// ─────────────────────────────────────────────────────────────────
// Coordinator: cache + signal state behind one lock
// ─────────────────────────────────────────────────────────────────

struct AnalyticsInner {
    cache: DerivedCache,
    signals: SignalStateStore,
}

/// Shared analytics front: a snapshot-version change purges the
/// derived cache atomically before any dependent computation runs.
pub struct Analytics {
    params: EngineParams,
    inner: Mutex<AnalyticsInner>,
}

impl Analytics {
    pub fn new(params: EngineParams) -> Self {
        Self {
            params,
            inner: Mutex::new(AnalyticsInner {
                cache: DerivedCache::new(),
                signals: SignalStateStore::new(),
            }),
        }
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    /// Derived rows for a configuration at a snapshot version,
    /// memoized per (version, timeframe, factor)
    pub fn derived(
        &self,
        snapshot: &Snapshot,
        version: SnapshotVersion,
        timeframe: Timeframe,
        factor: FactorKind,
        now_ts: i64,
    ) -> Arc<EngineOutput> {
        let mut inner = self.inner.lock().expect("analytics lock poisoned");
        let AnalyticsInner { cache, signals } = &mut *inner;
        cache.get_or_compute(version, (timeframe, factor), || {
            compute_rows(
                &snapshot.rows,
                timeframe,
                factor,
                &self.params,
                signals,
                now_ts,
            )
        })
    }

    /// Signal-state entry count for a configuration (stats block)
    pub fn signal_entries(&self, timeframe: Timeframe, factor: FactorKind) -> usize {
        self.inner
            .lock()
            .expect("analytics lock poisoned")
            .signals
            .len((timeframe, factor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> EngineParams {
        EngineParams {
            mcx_factor: FactorKind::Mini,
            jackpot_touch_lookback_sec: 1800,
            jackpot_min_confirmation: 3,
            jackpot_min_rr: 2.2,
            min_volume_accel: 1.15,
            max_spike_points_mult: 2.5,
        }
    }

    fn row(symbol: &str, ltp: Option<f64>, close: Option<f64>, volume: Option<f64>) -> BaseRow {
        BaseRow {
            symbol: symbol.to_string(),
            tsym: Some(symbol.replace('|', "_")),
            exchange: Some("NSE".to_string()),
            token: None,
            ltp,
            volume,
            first_1m_close: close,
            first_5m_close: close,
            first_15m_close: close,
            fetch_done: true,
            updated_at: None,
            digit_analyses: None,
            selected_digit: None,
            selected_analysis: None,
            gamma_move: None,
            range_shifts: None,
            traderscope_ready: None,
        }
    }

    fn compute(
        rows: &[BaseRow],
        signals: &mut SignalStateStore,
        now_ts: i64,
    ) -> EngineOutput {
        compute_rows(
            rows,
            Timeframe::M5,
            FactorKind::Micro,
            &params(),
            signals,
            now_ts,
        )
    }

    #[test]
    fn numeric_guard_skips_rows_but_keeps_symbols() {
        let mut signals = SignalStateStore::new();
        let rows = vec![
            row("NSE|1", Some(100.5), Some(100.0), Some(1000.0)),
            row("NSE|2", None, Some(100.0), Some(1000.0)),
            row("NSE|3", Some(100.5), None, None),
        ];
        let out = compute(&rows, &mut signals, 1000);
        assert_eq!(out.all_rows.len(), 1);
        // All three symbols were "seen", so none is evicted...
        let cfg = (Timeframe::M5, FactorKind::Micro);
        assert_eq!(signals.len(cfg), 1); // ...but only computed rows commit state

        // A skipped symbol that recovers picks up cleanly next run
        let rows = vec![
            row("NSE|1", Some(100.6), Some(100.0), Some(1100.0)),
            row("NSE|2", Some(100.2), Some(100.0), Some(500.0)),
        ];
        let out = compute(&rows, &mut signals, 1001);
        assert_eq!(out.all_rows.len(), 2);
    }

    #[test]
    fn rows_sorted_by_symbol_then_tsym() {
        let mut signals = SignalStateStore::new();
        let rows = vec![
            row("NSE|9", Some(100.5), Some(100.0), None),
            row("BSE|1", Some(100.5), Some(100.0), None),
            row("NSE|1", Some(100.5), Some(100.0), None),
        ];
        let out = compute(&rows, &mut signals, 1000);
        let symbols: Vec<&str> = out.all_rows.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BSE|1", "NSE|1", "NSE|9"]);
    }

    #[test]
    fn trigger_rows_are_the_in_range_up_subset() {
        let mut signals = SignalStateStore::new();
        let rows = vec![
            row("NSE|1", Some(100.5), Some(100.0), None), // above BU1
            row("NSE|2", Some(100.1), Some(100.0), None), // sideways
            row("NSE|3", Some(99.0), Some(100.0), None),  // below BE1
        ];
        let out = compute(&rows, &mut signals, 1000);
        assert_eq!(out.all_rows.len(), 3);
        assert_eq!(out.trigger_rows.len(), 1);
        let trig = &out.trigger_rows[0];
        assert_eq!(trig.symbol, "NSE|1");
        assert!(trig.in_range_up && !trig.sideways);
        assert_eq!(trig.trend, Trend::Up);
    }

    #[test]
    fn trend_partition_is_exclusive() {
        let mut signals = SignalStateStore::new();
        let rows = vec![
            row("NSE|1", Some(102.0), Some(100.0), None),
            row("NSE|2", Some(100.0), Some(100.0), None),
            row("NSE|3", Some(98.0), Some(100.0), None),
        ];
        let out = compute(&rows, &mut signals, 1000);
        for r in &out.all_rows {
            let up = r.ltp >= r.bu1;
            let down = r.ltp <= r.be1;
            match r.trend {
                Trend::Up => assert!(up),
                Trend::Down => assert!(down),
                Trend::Sideways => assert!(!up && !down && r.sideways),
            }
        }
    }

    #[test]
    fn signal_state_carries_prev_ltp_across_versions() {
        let mut signals = SignalStateStore::new();
        let rows_v1 = vec![row("NSE|1", Some(100.40), Some(100.0), Some(1000.0))];
        compute(&rows_v1, &mut signals, 1000);

        let state = signals.get((Timeframe::M5, FactorKind::Micro), "NSE|1");
        assert_eq!(state.prev_ltp, Some(100.40));
        assert_eq!(state.prev_volume, Some(1000.0));

        // volume delta against prior volume, accel against prior delta
        let rows_v2 = vec![row("NSE|1", Some(100.50), Some(100.0), Some(1400.0))];
        let out = compute(&rows_v2, &mut signals, 1001);
        assert_eq!(out.all_rows[0].volume_delta, 400.0);
        assert_eq!(out.all_rows[0].volume_accel, 1.0); // first delta

        let rows_v3 = vec![row("NSE|1", Some(100.55), Some(100.0), Some(2000.0))];
        let out = compute(&rows_v3, &mut signals, 1002);
        assert_eq!(out.all_rows[0].volume_delta, 600.0);
        assert!((out.all_rows[0].volume_accel - 1.5).abs() < 1e-9);
    }

    #[test]
    fn be5_reversal_jackpot_full_cycle() {
        let mut signals = SignalStateStore::new();
        // Tick 1: crash through BE5 (98.6945 for close=100 micro)
        let rows = vec![row("NSE|1", Some(98.50), Some(100.0), Some(1000.0))];
        let out = compute(&rows, &mut signals, 1000);
        assert!(out.all_rows[0].be5_touched_recent);
        assert!(!out.all_rows[0].jackpot_be5_reversal);

        // Tick 2: build a volume-delta baseline below BU1
        let rows = vec![row("NSE|1", Some(100.10), Some(100.0), Some(2000.0))];
        let out = compute(&rows, &mut signals, 1060);
        assert!(out.all_rows[0].be5_touched_recent);
        assert!(!out.all_rows[0].jackpot_be5_reversal);

        // Tick 3: recover just across BU1 with accelerating volume.
        // ltp=100.27: confirmation=1 < 3, so still no jackpot...
        let rows = vec![row("NSE|1", Some(100.27), Some(100.0), Some(3500.0))];
        let out = compute(&rows, &mut signals, 1120);
        let r = &out.all_rows[0];
        assert!(r.ltp >= r.bu1);
        assert!(!r.jackpot_be5_reversal);
        assert_eq!(r.confirmation, 1);

        // ...whereas a relaxed-confirmation engine accepts the cross
        let mut relaxed = params();
        relaxed.jackpot_min_confirmation = 1;
        relaxed.jackpot_min_rr = 0.0;
        let mut signals2 = SignalStateStore::new();
        compute_rows(
            &[row("NSE|1", Some(98.50), Some(100.0), Some(1000.0))],
            Timeframe::M5,
            FactorKind::Micro,
            &relaxed,
            &mut signals2,
            1000,
        );
        compute_rows(
            &[row("NSE|1", Some(100.10), Some(100.0), Some(2000.0))],
            Timeframe::M5,
            FactorKind::Micro,
            &relaxed,
            &mut signals2,
            1060,
        );
        let out = compute_rows(
            &[row("NSE|1", Some(100.27), Some(100.0), Some(3500.0))],
            Timeframe::M5,
            FactorKind::Micro,
            &relaxed,
            &mut signals2,
            1120,
        );
        let r = &out.all_rows[0];
        assert!(r.volume_accel >= 1.15, "accel={}", r.volume_accel);
        assert!(r.jackpot_be5_reversal);
    }

    #[test]
    fn be5_touch_expires_after_lookback() {
        let mut signals = SignalStateStore::new();
        let rows = vec![row("NSE|1", Some(98.50), Some(100.0), None)];
        compute(&rows, &mut signals, 1000);

        // 1799 s later: still recent
        let rows = vec![row("NSE|1", Some(100.0), Some(100.0), None)];
        let out = compute(&rows, &mut signals, 2799);
        assert!(out.all_rows[0].be5_touched_recent);

        // 1801 s after the touch: forgotten
        let out = compute(&rows, &mut signals, 2801);
        assert!(!out.all_rows[0].be5_touched_recent);
        let state = signals.get((Timeframe::M5, FactorKind::Micro), "NSE|1");
        assert!(state.be5_touch_ts.is_none());
        assert!(state.be5_min_ltp.is_none());
    }

    #[test]
    fn spike_flag_on_oversized_move() {
        let mut signals = SignalStateStore::new();
        // points = 0.2611, threshold = 0.65275
        let rows = vec![row("NSE|1", Some(100.00), Some(100.0), None)];
        let out = compute(&rows, &mut signals, 1000);
        assert!(!out.all_rows[0].spike_flag); // no prior ltp

        let rows = vec![row("NSE|1", Some(101.00), Some(100.0), None)];
        let out = compute(&rows, &mut signals, 1001);
        assert!(out.all_rows[0].spike_flag);

        let rows = vec![row("NSE|1", Some(101.20), Some(100.0), None)];
        let out = compute(&rows, &mut signals, 1002);
        assert!(!out.all_rows[0].spike_flag); // 0.20 move is within bounds
    }

    #[test]
    fn probability_score_bounded_and_integer() {
        let mut signals = SignalStateStore::new();
        let rows: Vec<BaseRow> = (0..50)
            .map(|i| {
                row(
                    &format!("NSE|{i}"),
                    Some(95.0 + (i as f64) * 0.25),
                    Some(100.0),
                    Some(1000.0 * i as f64),
                )
            })
            .collect();
        let out = compute(&rows, &mut signals, 1000);
        for r in &out.all_rows {
            assert!((0..=100).contains(&r.probability_score), "{:?}", r.probability_score);
        }
    }

    #[test]
    fn analytics_memoizes_per_version_and_recomputes_on_change() {
        let analytics = Analytics::new(params());
        let snapshot = Snapshot {
            day: "2026-08-02".to_string(),
            updated_at: "-".to_string(),
            row_count: 1,
            rows: vec![row("NSE|1", Some(100.5), Some(100.0), Some(1000.0))],
            status: Value::Null,
        };
        let a = analytics.derived(&snapshot, 1, Timeframe::M5, FactorKind::Micro, 1000);
        let b = analytics.derived(&snapshot, 1, Timeframe::M5, FactorKind::Micro, 1000);
        assert!(Arc::ptr_eq(&a, &b));

        // Version advance: recompute, prev_ltp now set from run 1
        let c = analytics.derived(&snapshot, 2, Timeframe::M5, FactorKind::Micro, 1001);
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(
            analytics.signal_entries(Timeframe::M5, FactorKind::Micro),
            1
        );
    }
}
