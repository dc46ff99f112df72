//! Persistence Module
//!
//! The paper-trade store: a SQLite table of trade lifecycles plus the
//! per-day broker-limits counters, with idempotent schema migration
//! and CSV/JSON export of trade history.
//!
//! The engine is the exclusive writer (WAL, synchronous=NORMAL); view
//! handlers read through the same connection behind the mutex with a
//! 2000 ms busy timeout.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OpenFlags, Row};
use serde::Serialize;
use tracing::{debug, warn};

use crate::market_time;

// ─────────────────────────────────────────────────────────────────
// Trade model
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Open,
    Closed,
}

impl TradeStatus {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("open") {
            TradeStatus::Open
        } else {
            TradeStatus::Closed
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeStatus::Open => write!(f, "OPEN"),
            TradeStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

/// One paper trade, OPEN or CLOSED. Level prices are snapshotted at
/// entry; running metrics are maintained by the management pass.
#[derive(Debug, Clone, Serialize)]
pub struct PaperTrade {
    pub id: i64,
    pub symbol: String,
    pub tsym: String,
    pub exchange: String,
    pub day: String,
    pub timeframe: String,
    pub factor: f64,
    pub instrument_type: String,
    pub close_price: f64,
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
    pub sl_price: f64,
    pub tp_price: f64,
    pub tsl_trigger: f64,
    pub tsl_active: bool,
    pub tsl_sl_price: f64,
    pub entry_ltp: f64,
    /// Epoch milliseconds
    pub entry_ts: i64,
    pub exit_ltp: Option<f64>,
    pub exit_ts: Option<i64>,
    pub quantity: f64,
    pub reason: String,
    pub last_ltp: f64,
    pub max_ltp: f64,
    pub min_ltp: f64,
    pub runup: f64,
    pub drawdown: f64,
    pub max_profit_points: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub brokerage: f64,
    pub stt: f64,
    pub exchange_charges: f64,
    pub sebi_charges: f64,
    pub stamp_duty: f64,
    pub gst: f64,
    pub total_charges: f64,
    pub net_pnl: f64,
    pub status: TradeStatus,
    pub updated_at: i64,
}

/// Per-day broker counters as persisted
#[derive(Debug, Clone, Default, Serialize)]
pub struct BrokerCounterRow {
    pub day: String,
    pub orders_placed: u32,
    pub open_positions: u32,
    pub margin_used: f64,
    pub updated_at: i64,
}

// ─────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────

/// Columns every write degrades to when migration cannot catch the
/// live table up (operational continuity over completeness)
const MINIMAL_INSERT: &str = "INSERT INTO paper_trades \
    (symbol, tsym, exchange, day, entry_ltp, entry_ts, quantity, status, updated_at) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

pub struct TradeStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl TradeStore {
    /// Open (creating parents), apply pragmas, migrate
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
        }
        let conn = Connection::open(&path)
            .with_context(|| format!("open paper-trade db {}", path.display()))?;
        conn.busy_timeout(std::time::Duration::from_millis(2000))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
            path,
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an existing DB read-only (operational tooling)
    pub fn open_read_only(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("open paper-trade db {}", path.display()))?;
        conn.busy_timeout(std::time::Duration::from_millis(2000))?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Idempotent schema migration: create tables/indexes when absent,
    /// add any column the live table is missing.
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("trade store poisoned");
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS paper_trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                tsym TEXT NOT NULL DEFAULT '',
                exchange TEXT NOT NULL DEFAULT '',
                day TEXT NOT NULL DEFAULT '',
                timeframe TEXT NOT NULL DEFAULT '5m',
                factor REAL NOT NULL DEFAULT 0,
                instrument_type TEXT NOT NULL DEFAULT 'EQUITY',
                close_price REAL NOT NULL DEFAULT 0,
                points REAL NOT NULL DEFAULT 0,
                bu1 REAL NOT NULL DEFAULT 0,
                bu2 REAL NOT NULL DEFAULT 0,
                bu3 REAL NOT NULL DEFAULT 0,
                bu4 REAL NOT NULL DEFAULT 0,
                bu5 REAL NOT NULL DEFAULT 0,
                be1 REAL NOT NULL DEFAULT 0,
                be2 REAL NOT NULL DEFAULT 0,
                be3 REAL NOT NULL DEFAULT 0,
                be4 REAL NOT NULL DEFAULT 0,
                be5 REAL NOT NULL DEFAULT 0,
                sl_price REAL NOT NULL DEFAULT 0,
                tp_price REAL NOT NULL DEFAULT 0,
                tsl_trigger REAL NOT NULL DEFAULT 0,
                tsl_active INTEGER NOT NULL DEFAULT 0,
                tsl_sl_price REAL NOT NULL DEFAULT 0,
                entry_ltp REAL NOT NULL DEFAULT 0,
                entry_ts INTEGER NOT NULL DEFAULT 0,
                exit_ltp REAL,
                exit_ts INTEGER,
                quantity REAL NOT NULL DEFAULT 1,
                reason TEXT NOT NULL DEFAULT '',
                last_ltp REAL NOT NULL DEFAULT 0,
                max_ltp REAL NOT NULL DEFAULT 0,
                min_ltp REAL NOT NULL DEFAULT 0,
                runup REAL NOT NULL DEFAULT 0,
                drawdown REAL NOT NULL DEFAULT 0,
                max_profit_points REAL NOT NULL DEFAULT 0,
                pnl REAL NOT NULL DEFAULT 0,
                pnl_pct REAL NOT NULL DEFAULT 0,
                brokerage REAL NOT NULL DEFAULT 0,
                stt REAL NOT NULL DEFAULT 0,
                exchange_charges REAL NOT NULL DEFAULT 0,
                sebi_charges REAL NOT NULL DEFAULT 0,
                stamp_duty REAL NOT NULL DEFAULT 0,
                gst REAL NOT NULL DEFAULT 0,
                total_charges REAL NOT NULL DEFAULT 0,
                net_pnl REAL NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'OPEN',
                updated_at INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_paper_trades_status ON paper_trades(status);
            CREATE INDEX IF NOT EXISTS idx_paper_trades_symbol ON paper_trades(symbol);
            CREATE INDEX IF NOT EXISTS idx_paper_trades_day ON paper_trades(day);

            CREATE TABLE IF NOT EXISTS broker_limits (
                day TEXT PRIMARY KEY,
                orders_placed INTEGER NOT NULL DEFAULT 0,
                open_positions INTEGER NOT NULL DEFAULT 0,
                margin_used REAL NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )?;

        // Older DBs: add whatever columns the table predates.
        let mut present: Vec<String> = Vec::new();
        {
            let mut stmt = conn.prepare("PRAGMA table_info(paper_trades)")?;
            let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
            for name in names {
                present.push(name?);
            }
        }
        for (name, decl) in TRADE_COLUMNS {
            if !present.iter().any(|c| c == name) {
                debug!(column = name, "adding missing paper_trades column");
                conn.execute_batch(&format!(
                    "ALTER TABLE paper_trades ADD COLUMN {name} {decl}"
                ))?;
            }
        }
        Ok(())
    }

    // ── trade writes ────────────────────────────────────────────

    /// Insert an OPEN trade, returning its id. A failed insert runs
    /// migration and retries once, then degrades to the minimal
    /// column set.
    pub fn insert_trade(&self, trade: &PaperTrade) -> Result<i64> {
        match self.insert_full(trade) {
            Ok(id) => Ok(id),
            Err(first) => {
                debug!(error = %first, "trade insert failed, migrating and retrying");
                self.migrate()?;
                match self.insert_full(trade) {
                    Ok(id) => Ok(id),
                    Err(second) => {
                        warn!(error = %second, "trade insert degraded to minimal columns");
                        let conn = self.conn.lock().expect("trade store poisoned");
                        conn.execute(
                            MINIMAL_INSERT,
                            params![
                                trade.symbol,
                                trade.tsym,
                                trade.exchange,
                                trade.day,
                                trade.entry_ltp,
                                trade.entry_ts,
                                trade.quantity,
                                trade.status.to_string(),
                                trade.updated_at,
                            ],
                        )?;
                        Ok(conn.last_insert_rowid())
                    }
                }
            }
        }
    }

    fn insert_full(&self, t: &PaperTrade) -> Result<i64> {
        let conn = self.conn.lock().expect("trade store poisoned");
        conn.execute(
            "INSERT INTO paper_trades (
                symbol, tsym, exchange, day, timeframe, factor, instrument_type,
                close_price, points,
                bu1, bu2, bu3, bu4, bu5, be1, be2, be3, be4, be5,
                sl_price, tp_price, tsl_trigger, tsl_active, tsl_sl_price,
                entry_ltp, entry_ts, exit_ltp, exit_ts, quantity, reason,
                last_ltp, max_ltp, min_ltp, runup, drawdown, max_profit_points,
                pnl, pnl_pct,
                brokerage, stt, exchange_charges, sebi_charges, stamp_duty, gst,
                total_charges, net_pnl, status, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20,
                ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30,
                ?31, ?32, ?33, ?34, ?35, ?36, ?37, ?38, ?39, ?40,
                ?41, ?42, ?43, ?44, ?45, ?46, ?47, ?48
            )",
            params![
                t.symbol,
                t.tsym,
                t.exchange,
                t.day,
                t.timeframe,
                t.factor,
                t.instrument_type,
                t.close_price,
                t.points,
                t.bu1,
                t.bu2,
                t.bu3,
                t.bu4,
                t.bu5,
                t.be1,
                t.be2,
                t.be3,
                t.be4,
                t.be5,
                t.sl_price,
                t.tp_price,
                t.tsl_trigger,
                t.tsl_active as i64,
                t.tsl_sl_price,
                t.entry_ltp,
                t.entry_ts,
                t.exit_ltp,
                t.exit_ts,
                t.quantity,
                t.reason,
                t.last_ltp,
                t.max_ltp,
                t.min_ltp,
                t.runup,
                t.drawdown,
                t.max_profit_points,
                t.pnl,
                t.pnl_pct,
                t.brokerage,
                t.stt,
                t.exchange_charges,
                t.sebi_charges,
                t.stamp_duty,
                t.gst,
                t.total_charges,
                t.net_pnl,
                t.status.to_string(),
                t.updated_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Update a trade's mutable fields; same migrate-retry-degrade
    /// ladder as inserts.
    pub fn update_trade(&self, trade: &PaperTrade) -> Result<()> {
        match self.update_full(trade) {
            Ok(()) => Ok(()),
            Err(first) => {
                debug!(error = %first, "trade update failed, migrating and retrying");
                self.migrate()?;
                match self.update_full(trade) {
                    Ok(()) => Ok(()),
                    Err(second) => {
                        warn!(error = %second, "trade update degraded to minimal columns");
                        let conn = self.conn.lock().expect("trade store poisoned");
                        conn.execute(
                            "UPDATE paper_trades SET status = ?1, exit_ltp = ?2, exit_ts = ?3, \
                             pnl = ?4, updated_at = ?5 WHERE id = ?6",
                            params![
                                trade.status.to_string(),
                                trade.exit_ltp,
                                trade.exit_ts,
                                trade.pnl,
                                trade.updated_at,
                                trade.id,
                            ],
                        )?;
                        Ok(())
                    }
                }
            }
        }
    }

    fn update_full(&self, t: &PaperTrade) -> Result<()> {
        let conn = self.conn.lock().expect("trade store poisoned");
        conn.execute(
            "UPDATE paper_trades SET
                tsl_active = ?1, tsl_sl_price = ?2,
                exit_ltp = ?3, exit_ts = ?4, reason = ?5,
                last_ltp = ?6, max_ltp = ?7, min_ltp = ?8,
                runup = ?9, drawdown = ?10, max_profit_points = ?11,
                pnl = ?12, pnl_pct = ?13,
                brokerage = ?14, stt = ?15, exchange_charges = ?16,
                sebi_charges = ?17, stamp_duty = ?18, gst = ?19,
                total_charges = ?20, net_pnl = ?21,
                status = ?22, updated_at = ?23
             WHERE id = ?24",
            params![
                t.tsl_active as i64,
                t.tsl_sl_price,
                t.exit_ltp,
                t.exit_ts,
                t.reason,
                t.last_ltp,
                t.max_ltp,
                t.min_ltp,
                t.runup,
                t.drawdown,
                t.max_profit_points,
                t.pnl,
                t.pnl_pct,
                t.brokerage,
                t.stt,
                t.exchange_charges,
                t.sebi_charges,
                t.stamp_duty,
                t.gst,
                t.total_charges,
                t.net_pnl,
                t.status.to_string(),
                t.updated_at,
                t.id,
            ],
        )?;
        Ok(())
    }

    // ── trade reads ─────────────────────────────────────────────

    pub fn open_trades(&self) -> Result<Vec<PaperTrade>> {
        self.query_trades("SELECT * FROM paper_trades WHERE status = 'OPEN' ORDER BY id", &[])
    }

    pub fn open_trades_recent_first(&self, limit: usize) -> Result<Vec<PaperTrade>> {
        self.query_trades(
            "SELECT * FROM paper_trades WHERE status = 'OPEN' \
             ORDER BY updated_at DESC LIMIT ?1",
            &[&(limit as i64)],
        )
    }

    pub fn closed_trades_recent_first(&self, limit: usize) -> Result<Vec<PaperTrade>> {
        self.query_trades(
            "SELECT * FROM paper_trades WHERE status = 'CLOSED' \
             ORDER BY exit_ts DESC LIMIT ?1",
            &[&(limit as i64)],
        )
    }

    pub fn all_trades(&self) -> Result<Vec<PaperTrade>> {
        self.query_trades("SELECT * FROM paper_trades ORDER BY id", &[])
    }

    pub fn has_open_trade(&self, symbol: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("trade store poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(1) FROM paper_trades WHERE symbol = ?1 AND status = 'OPEN'",
            [symbol],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Most recent close timestamp for a symbol (cooldown anchor)
    pub fn last_close_ts(&self, symbol: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock().expect("trade store poisoned");
        let ts: Option<i64> = conn.query_row(
            "SELECT MAX(exit_ts) FROM paper_trades WHERE symbol = ?1 AND status = 'CLOSED'",
            [symbol],
            |row| row.get(0),
        )?;
        Ok(ts)
    }

    /// OPEN count and margin (entry_ltp * quantity) for a day
    pub fn open_position_usage(&self, day: &str) -> Result<(u32, f64)> {
        let conn = self.conn.lock().expect("trade store poisoned");
        conn.query_row(
            "SELECT COUNT(1), COALESCE(SUM(entry_ltp * quantity), 0) \
             FROM paper_trades WHERE day = ?1 AND status = 'OPEN'",
            [day],
            |row| Ok((row.get::<_, i64>(0)? as u32, row.get::<_, f64>(1)?)),
        )
        .map_err(Into::into)
    }

    fn query_trades(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::types::ToSql],
    ) -> Result<Vec<PaperTrade>> {
        let conn = self.conn.lock().expect("trade store poisoned");
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, trade_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // ── broker counters ─────────────────────────────────────────

    pub fn broker_counters(&self, day: &str) -> Result<BrokerCounterRow> {
        let conn = self.conn.lock().expect("trade store poisoned");
        let row = conn
            .query_row(
                "SELECT day, orders_placed, open_positions, margin_used, updated_at \
                 FROM broker_limits WHERE day = ?1",
                [day],
                |row| {
                    Ok(BrokerCounterRow {
                        day: row.get(0)?,
                        orders_placed: row.get::<_, i64>(1)? as u32,
                        open_positions: row.get::<_, i64>(2)? as u32,
                        margin_used: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                },
            )
            .unwrap_or_else(|_| BrokerCounterRow {
                day: day.to_string(),
                ..Default::default()
            });
        Ok(row)
    }

    /// Count an accepted entry; `orders_placed` is monotone within a day
    pub fn record_order(&self, day: &str, now_ms: i64) -> Result<()> {
        let conn = self.conn.lock().expect("trade store poisoned");
        conn.execute(
            "INSERT INTO broker_limits (day, orders_placed, updated_at) VALUES (?1, 1, ?2) \
             ON CONFLICT(day) DO UPDATE SET \
             orders_placed = orders_placed + 1, updated_at = ?2",
            params![day, now_ms],
        )?;
        Ok(())
    }

    /// Refresh the derived columns of the day's counter row
    pub fn sync_broker_usage(&self, day: &str, now_ms: i64) -> Result<()> {
        let (open_positions, margin_used) = self.open_position_usage(day)?;
        let conn = self.conn.lock().expect("trade store poisoned");
        conn.execute(
            "INSERT INTO broker_limits (day, open_positions, margin_used, updated_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(day) DO UPDATE SET \
             open_positions = ?2, margin_used = ?3, updated_at = ?4",
            params![day, open_positions as i64, margin_used, now_ms],
        )?;
        Ok(())
    }

    // ── export ──────────────────────────────────────────────────

    pub fn export_trades(&self, dir: &Path, format: ExportFormat) -> Result<ExportResult> {
        let trades = self.all_trades()?;
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;

        let stamp = market_time::ist_now().format("%Y-%m-%d_%H%M%S");
        let filename = format!("trades_{stamp}.{}", format.extension());
        let path = dir.join(&filename);

        match format {
            ExportFormat::Csv => {
                let mut writer = csv::WriterBuilder::new()
                    .from_path(&path)
                    .with_context(|| format!("create {}", path.display()))?;
                for trade in &trades {
                    writer.serialize(trade)?;
                }
                writer.flush()?;
            }
            ExportFormat::Json => {
                let file = fs::File::create(&path)
                    .with_context(|| format!("create {}", path.display()))?;
                serde_json::to_writer_pretty(file, &trades)?;
            }
        }

        Ok(ExportResult {
            download_url: format!("/exports/{filename}"),
            filename,
            count: trades.len(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    pub filename: String,
    pub count: usize,
    pub download_url: String,
}

/// Column list for drift repair: name -> ALTER declaration
const TRADE_COLUMNS: &[(&str, &str)] = &[
    ("symbol", "TEXT NOT NULL DEFAULT ''"),
    ("tsym", "TEXT NOT NULL DEFAULT ''"),
    ("exchange", "TEXT NOT NULL DEFAULT ''"),
    ("day", "TEXT NOT NULL DEFAULT ''"),
    ("timeframe", "TEXT NOT NULL DEFAULT '5m'"),
    ("factor", "REAL NOT NULL DEFAULT 0"),
    ("instrument_type", "TEXT NOT NULL DEFAULT 'EQUITY'"),
    ("close_price", "REAL NOT NULL DEFAULT 0"),
    ("points", "REAL NOT NULL DEFAULT 0"),
    ("bu1", "REAL NOT NULL DEFAULT 0"),
    ("bu2", "REAL NOT NULL DEFAULT 0"),
    ("bu3", "REAL NOT NULL DEFAULT 0"),
    ("bu4", "REAL NOT NULL DEFAULT 0"),
    ("bu5", "REAL NOT NULL DEFAULT 0"),
    ("be1", "REAL NOT NULL DEFAULT 0"),
    ("be2", "REAL NOT NULL DEFAULT 0"),
    ("be3", "REAL NOT NULL DEFAULT 0"),
    ("be4", "REAL NOT NULL DEFAULT 0"),
    ("be5", "REAL NOT NULL DEFAULT 0"),
    ("sl_price", "REAL NOT NULL DEFAULT 0"),
    ("tp_price", "REAL NOT NULL DEFAULT 0"),
    ("tsl_trigger", "REAL NOT NULL DEFAULT 0"),
    ("tsl_active", "INTEGER NOT NULL DEFAULT 0"),
    ("tsl_sl_price", "REAL NOT NULL DEFAULT 0"),
    ("entry_ltp", "REAL NOT NULL DEFAULT 0"),
    ("entry_ts", "INTEGER NOT NULL DEFAULT 0"),
    ("exit_ltp", "REAL"),
    ("exit_ts", "INTEGER"),
    ("quantity", "REAL NOT NULL DEFAULT 1"),
    ("reason", "TEXT NOT NULL DEFAULT ''"),
    ("last_ltp", "REAL NOT NULL DEFAULT 0"),
    ("max_ltp", "REAL NOT NULL DEFAULT 0"),
    ("min_ltp", "REAL NOT NULL DEFAULT 0"),
    ("runup", "REAL NOT NULL DEFAULT 0"),
    ("drawdown", "REAL NOT NULL DEFAULT 0"),
    ("max_profit_points", "REAL NOT NULL DEFAULT 0"),
    ("pnl", "REAL NOT NULL DEFAULT 0"),
    ("pnl_pct", "REAL NOT NULL DEFAULT 0"),
    ("brokerage", "REAL NOT NULL DEFAULT 0"),
    ("stt", "REAL NOT NULL DEFAULT 0"),
    ("exchange_charges", "REAL NOT NULL DEFAULT 0"),
    ("sebi_charges", "REAL NOT NULL DEFAULT 0"),
    ("stamp_duty", "REAL NOT NULL DEFAULT 0"),
    ("gst", "REAL NOT NULL DEFAULT 0"),
    ("total_charges", "REAL NOT NULL DEFAULT 0"),
    ("net_pnl", "REAL NOT NULL DEFAULT 0"),
    ("status", "TEXT NOT NULL DEFAULT 'OPEN'"),
    ("updated_at", "INTEGER NOT NULL DEFAULT 0"),
];

fn trade_from_row(row: &Row<'_>) -> rusqlite::Result<PaperTrade> {
    Ok(PaperTrade {
        id: row.get("id")?,
        symbol: row.get("symbol")?,
        tsym: row.get("tsym")?,
        exchange: row.get("exchange")?,
        day: row.get("day")?,
        timeframe: row.get("timeframe")?,
        factor: row.get("factor")?,
        instrument_type: row.get("instrument_type")?,
        close_price: row.get("close_price")?,
        points: row.get("points")?,
        bu1: row.get("bu1")?,
        bu2: row.get("bu2")?,
        bu3: row.get("bu3")?,
        bu4: row.get("bu4")?,
        bu5: row.get("bu5")?,
        be1: row.get("be1")?,
        be2: row.get("be2")?,
        be3: row.get("be3")?,
        be4: row.get("be4")?,
        be5: row.get("be5")?,
        sl_price: row.get("sl_price")?,
        tp_price: row.get("tp_price")?,
        tsl_trigger: row.get("tsl_trigger")?,
        tsl_active: row.get::<_, i64>("tsl_active")? != 0,
        tsl_sl_price: row.get("tsl_sl_price")?,
        entry_ltp: row.get("entry_ltp")?,
        entry_ts: row.get("entry_ts")?,
        exit_ltp: row.get("exit_ltp")?,
        exit_ts: row.get("exit_ts")?,
        quantity: row.get("quantity")?,
        reason: row.get("reason")?,
        last_ltp: row.get("last_ltp")?,
        max_ltp: row.get("max_ltp")?,
        min_ltp: row.get("min_ltp")?,
        runup: row.get("runup")?,
        drawdown: row.get("drawdown")?,
        max_profit_points: row.get("max_profit_points")?,
        pnl: row.get("pnl")?,
        pnl_pct: row.get("pnl_pct")?,
        brokerage: row.get("brokerage")?,
        stt: row.get("stt")?,
        exchange_charges: row.get("exchange_charges")?,
        sebi_charges: row.get("sebi_charges")?,
        stamp_duty: row.get("stamp_duty")?,
        gst: row.get("gst")?,
        total_charges: row.get("total_charges")?,
        net_pnl: row.get("net_pnl")?,
        status: TradeStatus::parse(&row.get::<_, String>("status")?),
        updated_at: row.get("updated_at")?,
    })
}
