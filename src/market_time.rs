//! Market-time and exchange policies
//!
//! Every market-time comparison in the system runs on the Asia/Kolkata
//! clock. Exchanges are configured with an IST time-of-day close
//! threshold; crossing it both blocks new entries and force-closes
//! open positions.

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Asia::Kolkata;
use chrono_tz::Tz;
use serde::Serialize;

/// Exchanges with an explicit close policy; anything unrecognized
/// falls back to the NSE equity threshold.
pub const KNOWN_EXCHANGES: [&str; 5] = ["NSE", "BSE", "NFO", "BFO", "MCX"];

const EQUITY_CLOSE: (u32, u32, u32) = (15, 28, 30);
const MCX_CLOSE: (u32, u32, u32) = (23, 30, 0);

pub fn ist_now() -> DateTime<Tz> {
    Utc::now().with_timezone(&Kolkata)
}

/// IST calendar day in ISO form; the broker-limits day boundary
pub fn ist_day() -> String {
    ist_now().format("%Y-%m-%d").to_string()
}

pub fn ist_time_string() -> String {
    ist_now().format("%H:%M:%S").to_string()
}

pub fn ist_datetime_string() -> String {
    ist_now().format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn ist_hour() -> u32 {
    ist_now().hour()
}

/// IST close threshold for an exchange
pub fn close_threshold(exchange: &str) -> NaiveTime {
    let (h, m, s) = match exchange.trim().to_uppercase().as_str() {
        "MCX" => MCX_CLOSE,
        _ => EQUITY_CLOSE,
    };
    NaiveTime::from_hms_opt(h, m, s).expect("static close threshold")
}

/// Pure predicate against an explicit time-of-day (testable)
pub fn should_auto_close_at(exchange: &str, tod: NaiveTime) -> bool {
    tod >= close_threshold(exchange)
}

/// Has the exchange passed its IST close threshold right now?
pub fn should_auto_close(exchange: &str) -> bool {
    should_auto_close_at(exchange, ist_now().time())
}

/// Entry gate: the market must not have reached its close threshold
pub fn market_open_for_entry(exchange: &str) -> bool {
    !should_auto_close(exchange)
}

/// MCX evening session (IST hour >= 17), where the probability-score
/// entry threshold is relaxed
pub fn mcx_evening_session_at(hour: u32) -> bool {
    hour >= 17
}

pub fn mcx_evening_session() -> bool {
    mcx_evening_session_at(ist_hour())
}

/// Per-exchange market-time view for the composed dashboard status
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeTimeStatus {
    pub exchange: String,
    pub close_time: String,
    pub auto_close: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketTimeStatus {
    pub ist_time: String,
    pub ist_datetime: String,
    pub ist_day: String,
    pub exchanges: Vec<ExchangeTimeStatus>,
}

impl MarketTimeStatus {
    pub fn current() -> Self {
        let tod = ist_now().time();
        Self {
            ist_time: ist_time_string(),
            ist_datetime: ist_datetime_string(),
            ist_day: ist_day(),
            exchanges: KNOWN_EXCHANGES
                .iter()
                .map(|ex| ExchangeTimeStatus {
                    exchange: ex.to_string(),
                    close_time: close_threshold(ex).format("%H:%M:%S").to_string(),
                    auto_close: should_auto_close_at(ex, tod),
                })
                .collect(),
        }
    }
}
