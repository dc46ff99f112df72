//! Quick paper-trade DB inspection
//!
//! Usage: cargo run --bin check_trades [-- <db_path>]
//!
//! Prints open/total/closed counts, aggregate P&L and the ten most
//! recent trades without going through the HTTP surface.

use b5bot::persistence::{TradeStatus, TradeStore};

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "./out/paper_trades.db".to_string());
    let store = TradeStore::open_read_only(&path)?;

    let trades = store.all_trades()?;
    let open = trades
        .iter()
        .filter(|t| t.status == TradeStatus::Open)
        .count();
    let closed: Vec<_> = trades
        .iter()
        .filter(|t| t.status == TradeStatus::Closed)
        .collect();
    let pnl: f64 = closed.iter().map(|t| t.pnl).sum();
    let net: f64 = closed.iter().map(|t| t.net_pnl).sum();

    println!("Open trades: {open}");
    println!("Total trades: {}", trades.len());
    println!("Closed trades: {}", closed.len());
    println!("Total PnL: {pnl:.2}");
    println!("Net PnL (after charges): {net:.2}");

    println!("\nRecent trades:");
    let mut recent: Vec<_> = trades.iter().collect();
    recent.sort_by_key(|t| std::cmp::Reverse(t.entry_ts));
    for t in recent.iter().take(10) {
        let tail = match (t.status, t.exit_ltp) {
            (TradeStatus::Closed, Some(exit)) => {
                format!("CLOSED @ {exit:.2} | PnL {:.2} ({})", t.pnl, t.reason)
            }
            _ => "OPEN".to_string(),
        };
        println!(
            "  {}: Entry {:.2} | SL {:.2} | TP {:.2} | {}",
            t.symbol, t.entry_ltp, t.sl_price, t.tp_price, tail
        );
    }
    Ok(())
}
