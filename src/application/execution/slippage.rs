//! Slippage tolerance and minimum-output bounds.

use alloy_primitives::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

const BPS_DENOMINATOR: u64 = 10_000;

/// Resolve the tolerance for one swap: the caller's request or the default,
/// never below the floor and never above 100%.
#[must_use]
pub fn effective_slippage(requested: Option<Decimal>, default: Decimal, floor: Decimal) -> Decimal {
    requested
        .unwrap_or(default)
        .max(floor)
        .min(Decimal::ONE)
}

/// Minimum acceptable output for `quote` at the given tolerance.
#[must_use]
pub fn min_output(quote: U256, slippage: Decimal) -> U256 {
    let bps = (slippage * Decimal::from(BPS_DENOMINATOR))
        .ceil()
        .to_u64()
        .unwrap_or(BPS_DENOMINATOR)
        .min(BPS_DENOMINATOR);
    quote.saturating_mul(U256::from(BPS_DENOMINATOR - bps)) / U256::from(BPS_DENOMINATOR)
}
