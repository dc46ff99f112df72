//! Charge accounting
//!
//! Indian-market brokerage and statutory charges applied when a paper
//! trade closes. Turnover T = (entry + exit) * quantity; all rates are
//! flat multipliers except the capped brokerage and the buy-side-only
//! stamp duty.

use serde::Serialize;

const BROKERAGE_RATE: f64 = 0.0001;
const BROKERAGE_CAP: f64 = 20.0;
const STT_RATE_NSE_BSE: f64 = 0.00025;
const STT_RATE_OTHER: f64 = 0.0001;
const EXCHANGE_RATE: f64 = 0.0000325;
const SEBI_RATE: f64 = 0.000001;
const STAMP_DUTY_RATE: f64 = 0.00015;
const GST_RATE: f64 = 0.18;

/// Per-component charges for one closed trade
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ChargeBreakdown {
    pub brokerage: f64,
    pub stt: f64,
    pub exchange_charges: f64,
    pub sebi_charges: f64,
    pub stamp_duty: f64,
    pub gst: f64,
    pub total: f64,
}

pub fn compute_charges(
    entry_ltp: f64,
    exit_ltp: f64,
    quantity: f64,
    exchange_upper: &str,
) -> ChargeBreakdown {
    let turnover = (entry_ltp + exit_ltp) * quantity;

    let brokerage = (turnover * BROKERAGE_RATE).min(BROKERAGE_CAP);
    let stt_rate = if exchange_upper.starts_with("NSE") || exchange_upper.starts_with("BSE") {
        STT_RATE_NSE_BSE
    } else {
        STT_RATE_OTHER
    };
    let stt = turnover * stt_rate;
    let exchange_charges = turnover * EXCHANGE_RATE;
    let sebi_charges = turnover * SEBI_RATE;
    let stamp_duty = entry_ltp * quantity * STAMP_DUTY_RATE;
    let gst = (brokerage + exchange_charges) * GST_RATE;

    let total = brokerage + stt + exchange_charges + sebi_charges + stamp_duty + gst;
    ChargeBreakdown {
        brokerage,
        stt,
        exchange_charges,
        sebi_charges,
        stamp_duty,
        gst,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nse_trade_charges_sum_to_total() {
        let c = compute_charges(100.0, 102.0, 50.0, "NSE");
        let turnover: f64 = 202.0 * 50.0;
        assert!((c.brokerage - (turnover * 0.0001).min(20.0)).abs() < 1e-9);
        assert!((c.stt - turnover * 0.00025).abs() < 1e-9);
        assert!((c.stamp_duty - 100.0 * 50.0 * 0.00015).abs() < 1e-9);
        assert!((c.gst - (c.brokerage + c.exchange_charges) * 0.18).abs() < 1e-9);
        let sum = c.brokerage + c.stt + c.exchange_charges + c.sebi_charges + c.stamp_duty + c.gst;
        assert!((c.total - sum).abs() < 1e-9);
    }

    #[test]
    fn brokerage_caps_at_twenty() {
        let c = compute_charges(50_000.0, 51_000.0, 10.0, "NSE");
        assert!((c.brokerage - 20.0).abs() < 1e-9);
    }

    #[test]
    fn mcx_uses_lower_stt_rate() {
        let c = compute_charges(100.0, 102.0, 1.0, "MCX");
        assert!((c.stt - 202.0 * 0.0001).abs() < 1e-12);
    }
}
