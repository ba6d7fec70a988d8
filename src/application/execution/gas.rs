//! Gas pricing policy.
//!
//! Prices are the network estimate plus a margin; the policy prefers paying
//! more over a dropped transaction. Each retry bumps the price again.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

const BPS: u128 = 10_000;

/// Gas margins and the spike ceiling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasPolicy {
    /// Fraction added to the network estimate for price and limit.
    pub margin: Decimal,
    /// Fraction added to the previous price on each retry.
    pub retry_bump: Decimal,
    /// Network prices above this are refused as a spike.
    pub max_price_wei: Option<u128>,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            margin: Decimal::new(10, 2),
            retry_bump: Decimal::new(10, 2),
            max_price_wei: None,
        }
    }
}

/// The network gas price exceeded the configured ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasSpike {
    pub network_price: u128,
    pub ceiling: u128,
}

impl GasPolicy {
    /// Price for the first attempt.
    ///
    /// # Errors
    ///
    /// Returns [`GasSpike`] when the network price is above the ceiling.
    pub fn initial_price(&self, network_price: u128) -> Result<u128, GasSpike> {
        if let Some(ceiling) = self.max_price_wei {
            if network_price > ceiling {
                return Err(GasSpike {
                    network_price,
                    ceiling,
                });
            }
        }
        Ok(apply_margin(network_price, self.margin))
    }

    /// Gas limit from an estimate.
    #[must_use]
    pub fn limit(&self, estimate: u64) -> u64 {
        u64::try_from(apply_margin(u128::from(estimate), self.margin)).unwrap_or(u64::MAX)
    }

    /// Price for the next attempt.
    #[must_use]
    pub fn bump(&self, price: u128) -> u128 {
        apply_margin(price, self.retry_bump).max(price.saturating_add(1))
    }
}

/// `value * (1 + margin)`, rounded up.
#[must_use]
pub fn apply_margin(value: u128, margin: Decimal) -> u128 {
    let bps = (margin * Decimal::from(BPS))
        .ceil()
        .to_u128()
        .unwrap_or(0);
    let scaled = value.saturating_mul(BPS + bps);
    scaled / BPS + u128::from(scaled % BPS != 0)
}

/// Convert a gwei amount to wei.
#[must_use]
pub fn gwei_to_wei(gwei: Decimal) -> Option<u128> {
    (gwei * Decimal::from(1_000_000_000u64)).trunc().to_u128()
}
