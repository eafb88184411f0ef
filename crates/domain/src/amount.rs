use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Converts a raw fixed-point token amount into its human-readable value
/// using the mint's decimals.
///
/// Goes through `Decimal` so amounts inside its 96-bit range keep exact
/// scaling; larger magnitudes (summed u64 batches can exceed it) fall back
/// to plain f64 arithmetic.
pub fn to_ui_amount(raw: u128, decimals: u8) -> f64 {
    if raw <= i128::MAX as u128 {
        if let Ok(value) = Decimal::try_from_i128_with_scale(raw as i128, decimals as u32) {
            if let Some(value) = value.to_f64() {
                return value;
            }
        }
    }
    raw as f64 / 10f64.powi(decimals as i32)
}
