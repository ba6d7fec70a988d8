//! Monetary types for price and amount representation.

use rust_decimal::Decimal;

/// Price in quote currency (USD) per token, represented as a Decimal for precision.
pub type Price = Decimal;

/// Amount of quote currency (USD).
pub type UsdAmount = Decimal;

/// Token quantity in whole-token units.
pub type Quantity = Decimal;
