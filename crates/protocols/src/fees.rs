//! Normalized fee figures shared by all protocol adapters.

/// Fractional fee rates computed from a pool account's fixed-point
/// parameters. Each protocol has its own scale divisors; see the per-market
/// modules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeBreakdown {
    pub bin_step: i32,
    pub base_fee: f64,
    pub max_fee: f64,
    pub dynamic_fee: f64,
    pub protocol_fee: f64,
}

/// Ceiling used where a protocol has no natural maximum fee.
pub const DEFAULT_MAX_FEE: f64 = 10.0;
