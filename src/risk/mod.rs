//! Broker Limits Governor
//!
//! Per-day order and position counters with a color-coded safety
//! verdict. Entries are blocked on red; margin usage is tracked and
//! reported but never blocks on its own.

use serde::Serialize;
use std::fmt;

use crate::config::BrokerLimitsConfig;
use crate::persistence::{BrokerCounterRow, TradeStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitStatus {
    Green,
    Yellow,
    Red,
}

impl fmt::Display for LimitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitStatus::Green => write!(f, "green"),
            LimitStatus::Yellow => write!(f, "yellow"),
            LimitStatus::Red => write!(f, "red"),
        }
    }
}

/// Evaluated limits for one day
#[derive(Debug, Clone, Serialize)]
pub struct BrokerLimitsReport {
    pub day: String,
    pub orders_placed: u32,
    pub max_orders_per_day: u32,
    pub orders_remaining: u32,
    pub open_positions: u32,
    pub max_open_positions: u32,
    pub positions_remaining: u32,
    pub margin_used: f64,
    /// Advisory ceiling, percent of notional capital
    pub max_margin_used_pct: f64,
    pub status: LimitStatus,
    pub safe_to_trade: bool,
}

pub struct BrokerGovernor {
    cfg: BrokerLimitsConfig,
}

impl BrokerGovernor {
    pub fn new(cfg: BrokerLimitsConfig) -> Self {
        Self { cfg }
    }

    /// Pure verdict over the day's counters
    pub fn evaluate(
        &self,
        day: &str,
        orders_placed: u32,
        open_positions: u32,
        margin_used: f64,
    ) -> BrokerLimitsReport {
        let orders_remaining = self.cfg.max_orders_per_day.saturating_sub(orders_placed);
        let positions_remaining = self.cfg.max_open_positions.saturating_sub(open_positions);

        let orders_frac = remaining_fraction(orders_remaining, self.cfg.max_orders_per_day);
        let positions_frac = remaining_fraction(positions_remaining, self.cfg.max_open_positions);

        let status = if orders_frac < 0.20 || positions_frac < 0.20 {
            LimitStatus::Red
        } else if orders_frac < 0.50 || positions_frac < 0.50 {
            LimitStatus::Yellow
        } else {
            LimitStatus::Green
        };

        BrokerLimitsReport {
            day: day.to_string(),
            orders_placed,
            max_orders_per_day: self.cfg.max_orders_per_day,
            orders_remaining,
            open_positions,
            max_open_positions: self.cfg.max_open_positions,
            positions_remaining,
            margin_used,
            max_margin_used_pct: self.cfg.max_margin_used_pct,
            status,
            safe_to_trade: status != LimitStatus::Red,
        }
    }

    /// Verdict from the persisted counters + live OPEN rows
    pub fn report(&self, store: &TradeStore, day: &str) -> BrokerLimitsReport {
        let counters: BrokerCounterRow = store.broker_counters(day).unwrap_or_default();
        let (open_positions, margin_used) = store.open_position_usage(day).unwrap_or((0, 0.0));
        self.evaluate(day, counters.orders_placed, open_positions, margin_used)
    }
}

fn remaining_fraction(remaining: u32, limit: u32) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    remaining as f64 / limit as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governor() -> BrokerGovernor {
        BrokerGovernor::new(BrokerLimitsConfig {
            max_orders_per_day: 2000,
            max_open_positions: 100,
            max_margin_used_pct: 80.0,
        })
    }

    #[test]
    fn green_when_headroom_is_wide() {
        let report = governor().evaluate("2026-08-02", 10, 5, 1000.0);
        assert_eq!(report.status, LimitStatus::Green);
        assert!(report.safe_to_trade);
        assert_eq!(report.orders_remaining, 1990);
        assert_eq!(report.positions_remaining, 95);
    }

    #[test]
    fn yellow_below_half_headroom() {
        // 1001 orders placed -> 999 remaining < 50% of 2000
        let report = governor().evaluate("2026-08-02", 1001, 0, 0.0);
        assert_eq!(report.status, LimitStatus::Yellow);
        assert!(report.safe_to_trade);

        // positions alone can also trip yellow
        let report = governor().evaluate("2026-08-02", 0, 51, 0.0);
        assert_eq!(report.status, LimitStatus::Yellow);
    }

    #[test]
    fn red_below_fifth_headroom_blocks() {
        // 1601 placed -> 399 remaining < 20% of 2000
        let report = governor().evaluate("2026-08-02", 1601, 0, 0.0);
        assert_eq!(report.status, LimitStatus::Red);
        assert!(!report.safe_to_trade);

        let report = governor().evaluate("2026-08-02", 0, 81, 0.0);
        assert_eq!(report.status, LimitStatus::Red);
    }

    #[test]
    fn counters_saturate_at_limits() {
        let report = governor().evaluate("2026-08-02", 5000, 200, 0.0);
        assert_eq!(report.orders_remaining, 0);
        assert_eq!(report.positions_remaining, 0);
        assert_eq!(report.status, LimitStatus::Red);
    }

    #[test]
    fn margin_is_reported_but_never_blocks() {
        let report = governor().evaluate("2026-08-02", 0, 0, 1e12);
        assert_eq!(report.status, LimitStatus::Green);
        assert!(report.safe_to_trade);
        assert!((report.margin_used - 1e12).abs() < 1.0);
    }
}
