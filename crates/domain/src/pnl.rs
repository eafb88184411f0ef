use serde::{Deserialize, Serialize};

/// Realized profit-and-loss for a liquidity position, reconstructed from
/// its full on-chain event history. Computed on demand, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionPnl {
    /// Pair name ("BASE/QUOTE").
    pub name: String,
    /// USD value deposited over the position's lifetime, at open-time prices.
    pub open_amount_usd: f64,
    /// USD value withdrawn over the position's lifetime, at close-time prices.
    pub close_amount_usd: f64,
    /// `close_amount_usd - open_amount_usd`.
    pub delta_usd: f64,
    /// Percentage return relative to the open value.
    pub pnl_percent: f64,
    /// Seconds between the last increase and the last decrease.
    pub duration_secs: i64,
    /// Position value at open time.
    pub tvl_at_open: f64,
}

/// Percentage return with the zero-division policy: nothing in and nothing
/// out is 0%, nothing in but something out is 100%.
pub fn pnl_percent(open_amount_usd: f64, close_amount_usd: f64) -> f64 {
    if open_amount_usd == 0.0 {
        if close_amount_usd == 0.0 { 0.0 } else { 100.0 }
    } else {
        (close_amount_usd - open_amount_usd) / open_amount_usd * 100.0
    }
}
