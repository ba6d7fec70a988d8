//! Conversions between decimal amounts and ERC-20 base units.

use alloy_primitives::U256;
use rust_decimal::Decimal;

/// Largest scale a [`Decimal`] can carry.
const MAX_DECIMAL_SCALE: u32 = 28;

/// Convert a decimal token amount to base units, truncating dust below one
/// unit. Returns `None` for negative amounts.
#[must_use]
pub fn to_units(amount: Decimal, decimals: u8) -> Option<U256> {
    if amount.is_sign_negative() {
        return None;
    }
    let normalized = amount.normalize();
    let mantissa = u128::try_from(normalized.mantissa()).ok()?;
    let scale = normalized.scale();
    let decimals = u32::from(decimals);
    let ten = U256::from(10u8);

    let units = if decimals >= scale {
        U256::from(mantissa).checked_mul(ten.pow(U256::from(decimals - scale)))?
    } else {
        U256::from(mantissa) / ten.pow(U256::from(scale - decimals))
    };
    Some(units)
}

/// Convert base units to a decimal token amount, dropping least significant
/// digits when the value exceeds decimal precision.
#[must_use]
pub fn from_units(units: U256, decimals: u8) -> Option<Decimal> {
    let max_mantissa = U256::from(Decimal::MAX.mantissa().unsigned_abs());
    let mut value = units;
    let mut scale = u32::from(decimals);
    while value > max_mantissa || scale > MAX_DECIMAL_SCALE {
        if scale == 0 {
            return None;
        }
        value /= U256::from(10u8);
        scale -= 1;
    }
    let mantissa = i128::try_from(u128::try_from(value).ok()?).ok()?;
    Some(Decimal::from_i128_with_scale(mantissa, scale).normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn scales_to_token_decimals() {
        assert_eq!(to_units(dec!(100), 6), Some(U256::from(100_000_000u64)));
        assert_eq!(
            to_units(dec!(1.5), 18),
            Some(U256::from(1_500_000_000_000_000_000u128))
        );
    }

    #[test]
    fn truncates_sub_unit_dust() {
        assert_eq!(to_units(dec!(0.0000019), 6), Some(U256::from(1u8)));
    }

    #[test]
    fn rejects_negative() {
        assert_eq!(to_units(dec!(-1), 6), None);
    }

    #[test]
    fn reads_back_base_units() {
        assert_eq!(from_units(U256::from(2_500_000u64), 6), Some(dec!(2.5)));
        assert_eq!(
            from_units(U256::from(1_000_000_000_000_000_000u128), 18),
            Some(dec!(1))
        );
    }

    #[test]
    fn large_values_lose_precision_not_magnitude() {
        let huge = U256::from(10u8).pow(U256::from(40u8));
        let value = from_units(huge, 18).unwrap_or_default();
        assert_eq!(value, dec!(10000000000000000000000));
    }
}
