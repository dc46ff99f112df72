//! Configuration management for B5Bot
//!
//! Loads from optional config files + environment variables via .env.
//! The flat environment names (`PAPER_TF`, `MIN_RR`, ...) are the
//! operational interface; `B5BOT__`-prefixed variables and the config
//! file cover the same keys for structured deployments.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::types::{FactorKind, Timeframe};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub paper: PaperConfig,
    pub limits: BrokerLimitsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen port
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Base directory for producer outputs
    pub data_dir: String,
    /// Producer snapshot JSON file
    pub snapshot_file: String,
    /// Read-only first-close / history-state DB
    pub first_close_db: String,
    /// Paper-trade DB (exclusive writer)
    pub paper_db: String,
    /// Export directory for CSV/JSON trade dumps
    pub exports_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaperConfig {
    /// Live configuration the paper engine trades on ("1m"|"5m"|"15m")
    pub tf: String,
    /// Factor for the live configuration ("micro"|"mini"|"mega"|"smart")
    pub factor: String,
    /// Factor override applied to MCX instruments
    pub factor_mcx: String,
    /// Per-symbol re-entry cooldown after a close, seconds
    pub cooldown_sec: u64,
    /// Engine cycle interval, milliseconds (floored at 500)
    pub cycle_ms: u64,
    /// "paper" or "live"
    pub trade_mode: String,
    /// Live trading stays off unless this is set explicitly
    pub enable_live_trading: bool,
    /// Require trend == UP on entry
    pub trend_only: bool,
    /// Minimum trend-aligned break count on entry
    pub min_confirmation: u32,
    /// Minimum reward:risk to BU5 on entry
    pub min_rr: f64,
    /// Only enter on the BE5-reversal jackpot signal
    pub jackpot_only: bool,
    /// BE5 touch recency window, seconds
    pub jackpot_touch_lookback_sec: i64,
    /// Defaults to max(min_confirmation, 3) when unset
    pub jackpot_min_confirmation: Option<u32>,
    /// Defaults to max(min_rr, 2.2) when unset
    pub jackpot_min_rr: Option<f64>,
    /// Minimum volume acceleration for the jackpot predicate
    pub min_volume_accel: f64,
    /// Minimum probability score on entry
    pub min_probability_score: i64,
    /// Spike threshold in multiples of `points`
    pub max_spike_points_mult: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerLimitsConfig {
    pub max_orders_per_day: u32,
    pub max_open_positions: u32,
    /// Advisory margin ceiling, percent
    pub max_margin_used_pct: f64,
}

impl PaperConfig {
    pub fn timeframe(&self) -> Timeframe {
        Timeframe::parse(&self.tf).unwrap_or_default()
    }

    pub fn factor_kind(&self) -> FactorKind {
        FactorKind::parse(&self.factor).unwrap_or_default()
    }

    pub fn factor_mcx_kind(&self) -> FactorKind {
        FactorKind::parse(&self.factor_mcx).unwrap_or(FactorKind::Mini)
    }

    /// Cycle interval with the 500 ms floor applied
    pub fn cycle_ms_clamped(&self) -> u64 {
        self.cycle_ms.max(500)
    }

    pub fn jackpot_min_confirmation(&self) -> u32 {
        self.jackpot_min_confirmation
            .unwrap_or_else(|| self.min_confirmation.max(3))
    }

    pub fn jackpot_min_rr(&self) -> f64 {
        self.jackpot_min_rr.unwrap_or_else(|| self.min_rr.max(2.2))
    }

    /// Live mode requires both the mode and the explicit enable gate
    pub fn live_enabled(&self) -> bool {
        self.trade_mode.eq_ignore_ascii_case("live") && self.enable_live_trading
    }

    /// The mode the engine actually runs in
    pub fn effective_trade_mode(&self) -> &'static str {
        if self.live_enabled() {
            "live"
        } else {
            "paper"
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, optional files, and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Server defaults
            .set_default("server.port", 8787)?
            // Data location defaults
            .set_default("data.data_dir", "./out")?
            .set_default("data.snapshot_file", "./out/ui_snapshot.json")?
            .set_default("data.first_close_db", "./out/history.db")?
            .set_default("data.paper_db", "./out/paper_trades.db")?
            .set_default("data.exports_dir", "./exports")?
            // Paper engine defaults
            .set_default("paper.tf", "5m")?
            .set_default("paper.factor", "smart")?
            .set_default("paper.factor_mcx", "mini")?
            .set_default("paper.cooldown_sec", 30)?
            .set_default("paper.cycle_ms", 1500)?
            .set_default("paper.trade_mode", "paper")?
            .set_default("paper.enable_live_trading", false)?
            .set_default("paper.trend_only", true)?
            .set_default("paper.min_confirmation", 2)?
            .set_default("paper.min_rr", 0.5)?
            .set_default("paper.jackpot_only", false)?
            .set_default("paper.jackpot_touch_lookback_sec", 1800)?
            .set_default("paper.min_volume_accel", 1.15)?
            .set_default("paper.min_probability_score", 35)?
            .set_default("paper.max_spike_points_mult", 2.5)?
            // Broker limit defaults
            .set_default("limits.max_orders_per_day", 2000)?
            .set_default("limits.max_open_positions", 100)?
            .set_default("limits.max_margin_used_pct", 80.0)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (B5BOT_*)
            .add_source(Environment::with_prefix("B5BOT").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let mut app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.apply_flat_env();
        Ok(app_config)
    }

    /// Overlay the flat operational environment names
    fn apply_flat_env(&mut self) {
        env_u16("PORT", &mut self.server.port);
        env_string("DATA_DIR", &mut self.data.data_dir);
        env_string("SNAPSHOT_FILE", &mut self.data.snapshot_file);
        env_string("FIRST_CLOSE_DB", &mut self.data.first_close_db);
        env_string("PAPER_DB", &mut self.data.paper_db);
        env_string("EXPORTS_DIR", &mut self.data.exports_dir);

        env_string("PAPER_TF", &mut self.paper.tf);
        env_string("PAPER_FACTOR", &mut self.paper.factor);
        env_string("PAPER_FACTOR_MCX", &mut self.paper.factor_mcx);
        env_u64("PAPER_COOLDOWN_SEC", &mut self.paper.cooldown_sec);
        env_u64("PAPER_CYCLE_MS", &mut self.paper.cycle_ms);
        env_string("TRADE_MODE", &mut self.paper.trade_mode);
        env_bool("ENABLE_LIVE_TRADING", &mut self.paper.enable_live_trading);
        env_bool("TREND_ONLY", &mut self.paper.trend_only);
        env_u32("MIN_CONFIRMATION", &mut self.paper.min_confirmation);
        env_f64("MIN_RR", &mut self.paper.min_rr);
        env_bool("JACKPOT_ONLY", &mut self.paper.jackpot_only);
        env_i64(
            "JACKPOT_TOUCH_LOOKBACK_SEC",
            &mut self.paper.jackpot_touch_lookback_sec,
        );
        env_opt_u32(
            "JACKPOT_MIN_CONFIRMATION",
            &mut self.paper.jackpot_min_confirmation,
        );
        env_opt_f64("JACKPOT_MIN_RR", &mut self.paper.jackpot_min_rr);
        env_f64("MIN_VOLUME_ACCEL", &mut self.paper.min_volume_accel);
        env_i64(
            "MIN_PROBABILITY_SCORE",
            &mut self.paper.min_probability_score,
        );
        env_f64("MAX_SPIKE_POINTS_MULT", &mut self.paper.max_spike_points_mult);

        env_u32("MAX_ORDERS_PER_DAY", &mut self.limits.max_orders_per_day);
        env_u32("MAX_OPEN_POSITIONS", &mut self.limits.max_open_positions);
        env_f64("MAX_MARGIN_USED_PCT", &mut self.limits.max_margin_used_pct);
    }

    /// Generate a digest of the config for startup logging
    pub fn digest(&self) -> String {
        format!(
            "port={} tf={} factor={} mode={} cycle_ms={} min_conf={} min_rr={:.2} jackpot_only={}",
            self.server.port,
            self.paper.tf,
            self.paper.factor,
            self.paper.effective_trade_mode(),
            self.paper.cycle_ms_clamped(),
            self.paper.min_confirmation,
            self.paper.min_rr,
            self.paper.jackpot_only,
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

fn env_raw(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn env_string(name: &str, slot: &mut String) {
    if let Some(v) = env_raw(name) {
        *slot = v;
    }
}

fn env_bool(name: &str, slot: &mut bool) {
    if let Some(v) = env_raw(name) {
        *slot = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
    }
}

fn env_u16(name: &str, slot: &mut u16) {
    if let Some(v) = env_raw(name).and_then(|v| v.parse().ok()) {
        *slot = v;
    }
}

fn env_u32(name: &str, slot: &mut u32) {
    if let Some(v) = env_raw(name).and_then(|v| v.parse().ok()) {
        *slot = v;
    }
}

fn env_u64(name: &str, slot: &mut u64) {
    if let Some(v) = env_raw(name).and_then(|v| v.parse().ok()) {
        *slot = v;
    }
}

fn env_i64(name: &str, slot: &mut i64) {
    if let Some(v) = env_raw(name).and_then(|v| v.parse().ok()) {
        *slot = v;
    }
}

fn env_f64(name: &str, slot: &mut f64) {
    if let Some(v) = env_raw(name).and_then(|v| v.parse().ok()) {
        *slot = v;
    }
}

fn env_opt_u32(name: &str, slot: &mut Option<u32>) {
    if let Some(v) = env_raw(name).and_then(|v| v.parse().ok()) {
        *slot = Some(v);
    }
}

fn env_opt_f64(name: &str, slot: &mut Option<f64>) {
    if let Some(v) = env_raw(name).and_then(|v| v.parse().ok()) {
        *slot = Some(v);
    }
}
