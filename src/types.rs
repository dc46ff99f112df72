//! Core types used throughout B5Bot
//!
//! Defines the snapshot input model, the configuration enums
//! (timeframe, factor, trend) and the lenient numeric parsing shared
//! by every consumer of producer-written JSON.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Bar timeframe whose first-candle close anchors the level ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
}

impl Default for Timeframe {
    fn default() -> Self {
        Timeframe::M5
    }
}

impl Timeframe {
    /// Parse from string ("1m", "5m", "15m")
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "1m" | "1min" => Some(Timeframe::M1),
            "5m" | "5min" => Some(Timeframe::M5),
            "15m" | "15min" => Some(Timeframe::M15),
            _ => None,
        }
    }

    /// The first-candle close this timeframe reads from a base row
    pub fn first_close(&self, row: &BaseRow) -> Option<f64> {
        match self {
            Timeframe::M1 => row.first_1m_close,
            Timeframe::M5 => row.first_5m_close,
            Timeframe::M15 => row.first_15m_close,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeframe::M1 => write!(f, "1m"),
            Timeframe::M5 => write!(f, "5m"),
            Timeframe::M15 => write!(f, "15m"),
        }
    }
}

/// B5 factor multipliers
pub const FACTOR_MICRO: f64 = 0.002611;
pub const FACTOR_MINI: f64 = 0.0261;
pub const FACTOR_MEGA: f64 = 0.2611;

/// Requested factor for a derived-row configuration.
///
/// `Smart` defers to the per-row selector in [`crate::levels`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FactorKind {
    Micro,
    Mini,
    Mega,
    Smart,
}

impl Default for FactorKind {
    fn default() -> Self {
        FactorKind::Smart
    }
}

impl FactorKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "micro" => Some(FactorKind::Micro),
            "mini" => Some(FactorKind::Mini),
            "mega" => Some(FactorKind::Mega),
            "smart" => Some(FactorKind::Smart),
            _ => None,
        }
    }

    /// Fixed multiplier, or `None` for `Smart`
    pub fn value(&self) -> Option<f64> {
        match self {
            FactorKind::Micro => Some(FACTOR_MICRO),
            FactorKind::Mini => Some(FACTOR_MINI),
            FactorKind::Mega => Some(FACTOR_MEGA),
            FactorKind::Smart => None,
        }
    }
}

impl fmt::Display for FactorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactorKind::Micro => write!(f, "micro"),
            FactorKind::Mini => write!(f, "mini"),
            FactorKind::Mega => write!(f, "mega"),
            FactorKind::Smart => write!(f, "smart"),
        }
    }
}

/// Trend classification relative to the BU1/BE1 boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Up,
    Down,
    Sideways,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Up => write!(f, "UP"),
            Trend::Down => write!(f, "DOWN"),
            Trend::Sideways => write!(f, "SIDEWAYS"),
        }
    }
}

/// Instrument class detected from exchange + tradingsymbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstrumentType {
    Index,
    Option,
    Future,
    Equity,
    Commodity,
}

impl fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentType::Index => write!(f, "INDEX"),
            InstrumentType::Option => write!(f, "OPTION"),
            InstrumentType::Future => write!(f, "FUTURE"),
            InstrumentType::Equity => write!(f, "EQUITY"),
            InstrumentType::Commodity => write!(f, "COMMODITY"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Lenient numeric parsing
// ─────────────────────────────────────────────────────────────────

/// Deserialize a producer-written numeric that may arrive as a number,
/// a numeric string, an empty string, or null. Anything non-finite
/// collapses to `None`; consumers skip rows whose required numerics
/// are missing.
pub fn de_lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(value_to_f64))
}

/// Same leniency applied to a JSON value already in hand
pub fn value_to_f64(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                return None;
            }
            t.parse::<f64>().ok()?
        }
        _ => return None,
    };
    if n.is_finite() {
        Some(n)
    } else {
        None
    }
}

/// Deserialize a field that may arrive as a string or a bare number
/// (tradingsymbols and tokens are numeric-looking for some segments)
pub fn de_lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}

// ─────────────────────────────────────────────────────────────────
// Snapshot input model
// ─────────────────────────────────────────────────────────────────

/// One instrument row from the producer snapshot file.
///
/// `symbol` is `EXCHANGE|TOKEN` and unique within a snapshot. The
/// traderscope fields are opaque passthrough for the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseRow {
    pub symbol: String,
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub tsym: Option<String>,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub token: Option<String>,
    #[serde(default, deserialize_with = "de_lenient_f64")]
    pub ltp: Option<f64>,
    #[serde(default, deserialize_with = "de_lenient_f64")]
    pub volume: Option<f64>,
    #[serde(default, deserialize_with = "de_lenient_f64")]
    pub first_1m_close: Option<f64>,
    #[serde(default, deserialize_with = "de_lenient_f64")]
    pub first_5m_close: Option<f64>,
    #[serde(default, deserialize_with = "de_lenient_f64")]
    pub first_15m_close: Option<f64>,
    #[serde(default)]
    pub fetch_done: bool,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digit_analyses: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_digit: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_analysis: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gamma_move: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_shifts: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traderscope_ready: Option<Value>,
}

impl BaseRow {
    /// Uppercased exchange, empty when absent
    pub fn exchange_upper(&self) -> String {
        self.exchange
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_uppercase()
    }

    /// Uppercased tradingsymbol, empty when absent
    pub fn tsym_upper(&self) -> String {
        self.tsym.as_deref().unwrap_or("").trim().to_uppercase()
    }
}

fn default_dash() -> String {
    "-".to_string()
}

/// Atomic producer snapshot: one JSON object covering every tracked
/// instrument plus an opaque producer status block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default = "default_dash")]
    pub day: String,
    #[serde(default = "default_dash")]
    pub updated_at: String,
    #[serde(default)]
    pub row_count: u64,
    #[serde(default)]
    pub rows: Vec<BaseRow>,
    #[serde(default)]
    pub status: Value,
}

impl Snapshot {
    /// What an absent or unreadable snapshot file degrades to
    pub fn empty() -> Self {
        Self {
            day: "-".to_string(),
            updated_at: "-".to_string(),
            row_count: 0,
            rows: Vec::new(),
            status: Value::Null,
        }
    }
}
