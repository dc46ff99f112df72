//! B5 level ladders and the smart factor selector
//!
//! The level lattice is ten prices spaced by `points = close * factor`
//! around the session's first-candle close: BU1..BU5 above, BE1..BE5
//! below. The smart selector picks the factor per row from instrument
//! class and intraday move.

use crate::types::{FactorKind, InstrumentType, FACTOR_MEGA, FACTOR_MICRO, FACTOR_MINI};

/// Index tradingsymbols (exact match after uppercasing)
const INDEX_SYMBOLS: [&str; 4] = ["NIFTY", "BANKNIFTY", "FINNIFTY", "SENSEX"];

/// Classify an instrument from exchange + tradingsymbol.
///
/// Precedence mirrors the factor rules: commodity (MCX) first, then
/// index, option, future, equity.
pub fn detect_instrument_type(exchange_upper: &str, tsym_upper: &str) -> InstrumentType {
    if exchange_upper == "MCX" {
        return InstrumentType::Commodity;
    }
    if INDEX_SYMBOLS.contains(&tsym_upper) {
        return InstrumentType::Index;
    }
    if exchange_upper == "NFO"
        || exchange_upper == "BFO"
        || tsym_upper.ends_with("CE")
        || tsym_upper.ends_with("PE")
    {
        return InstrumentType::Option;
    }
    if tsym_upper.contains("FUT") {
        return InstrumentType::Future;
    }
    InstrumentType::Equity
}

/// Resolved factor for one row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorChoice {
    pub factor: f64,
    pub kind: FactorKind,
    pub reason: &'static str,
}

impl FactorChoice {
    fn micro(reason: &'static str) -> Self {
        Self {
            factor: FACTOR_MICRO,
            kind: FactorKind::Micro,
            reason,
        }
    }

    fn mini(reason: &'static str) -> Self {
        Self {
            factor: FACTOR_MINI,
            kind: FactorKind::Mini,
            reason,
        }
    }

    fn mega(reason: &'static str) -> Self {
        Self {
            factor: FACTOR_MEGA,
            kind: FactorKind::Mega,
            reason,
        }
    }

    fn fixed(kind: FactorKind) -> Self {
        match kind {
            FactorKind::Micro => Self::micro("fixed"),
            FactorKind::Mini => Self::mini("fixed"),
            FactorKind::Mega => Self::mega("fixed"),
            // A smart MCX override degenerates to the mini default
            FactorKind::Smart => Self::mini("fixed"),
        }
    }
}

/// Per-row smart factor selection
pub fn select_smart_factor(
    ltp: f64,
    close: f64,
    exchange_upper: &str,
    tsym_upper: &str,
) -> FactorChoice {
    if exchange_upper == "MCX" {
        return FactorChoice::mini("mcx_commodity");
    }

    let itype = detect_instrument_type(exchange_upper, tsym_upper);
    let move_pct = if close.abs() > f64::EPSILON {
        (ltp - close).abs() / close * 100.0
    } else {
        0.0
    };

    match itype {
        InstrumentType::Index => FactorChoice::micro("index"),
        InstrumentType::Option => {
            if move_pct > 10.0 {
                FactorChoice::mega("extreme_volatility_option")
            } else if move_pct > 5.0 {
                FactorChoice::mini("volatile_option")
            } else {
                FactorChoice::micro("option")
            }
        }
        InstrumentType::Future => {
            if move_pct > 3.0 {
                FactorChoice::mini("volatile_future")
            } else {
                FactorChoice::micro("future")
            }
        }
        InstrumentType::Equity | InstrumentType::Commodity => {
            if move_pct > 8.0 {
                FactorChoice::mega("extreme_volatility_equity")
            } else if move_pct > 5.0 {
                FactorChoice::mini("volatile_equity")
            } else {
                FactorChoice::micro("equity")
            }
        }
    }
}

/// Resolve the factor for a row under a configuration.
///
/// Fixed factors are used directly, except that MCX rows always take
/// the configured MCX factor. `Smart` defers to the per-row selector.
pub fn resolve_factor(
    configured: FactorKind,
    mcx_factor: FactorKind,
    ltp: f64,
    close: f64,
    exchange_upper: &str,
    tsym_upper: &str,
) -> FactorChoice {
    if exchange_upper == "MCX" {
        let mut choice = FactorChoice::fixed(mcx_factor);
        choice.reason = "mcx_commodity";
        return choice;
    }
    match configured {
        FactorKind::Smart => select_smart_factor(ltp, close, exchange_upper, tsym_upper),
        fixed => FactorChoice::fixed(fixed),
    }
}

/// The ten-level lattice around a first-candle close
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelLadder {
    pub close: f64,
    pub points: f64,
    pub bu: [f64; 5],
    pub be: [f64; 5],
}

pub const LEVEL_NAMES: [&str; 10] = [
    "BU1", "BU2", "BU3", "BU4", "BU5", "BE1", "BE2", "BE3", "BE4", "BE5",
];

impl LevelLadder {
    pub fn compute(close: f64, factor: f64) -> Self {
        let points = close * factor;
        let mut bu = [0.0; 5];
        let mut be = [0.0; 5];
        for k in 0..5 {
            let step = points * (k as f64 + 1.0);
            bu[k] = close + step;
            be[k] = close - step;
        }
        Self {
            close,
            points,
            bu,
            be,
        }
    }

    pub fn bu1(&self) -> f64 {
        self.bu[0]
    }

    pub fn bu5(&self) -> f64 {
        self.bu[4]
    }

    pub fn be1(&self) -> f64 {
        self.be[0]
    }

    pub fn be5(&self) -> f64 {
        self.be[4]
    }

    /// Value of a level by its BU/BE name
    pub fn level_value(&self, name: &str) -> Option<f64> {
        let idx = LEVEL_NAMES.iter().position(|n| *n == name)?;
        Some(if idx < 5 {
            self.bu[idx]
        } else {
            self.be[idx - 5]
        })
    }

    /// The level with minimum |ltp - level|; ties resolve to the
    /// first name in BU1..BU5, BE1..BE5 order
    pub fn nearest(&self, ltp: f64) -> (&'static str, f64) {
        let mut best_name = LEVEL_NAMES[0];
        let mut best_value = self.bu[0];
        let mut best_diff = (ltp - best_value).abs();
        for (idx, name) in LEVEL_NAMES.iter().enumerate() {
            let value = if idx < 5 {
                self.bu[idx]
            } else {
                self.be[idx - 5]
            };
            let diff = (ltp - value).abs();
            if diff < best_diff {
                best_name = name;
                best_value = value;
                best_diff = diff;
            }
        }
        (best_name, best_value)
    }
}
