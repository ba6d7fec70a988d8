//! Domain validation errors for core domain types.
//!
//! These errors are returned by `try_new` constructors that validate inputs.
//!
//! # Examples
//!
//! ```
//! use signalbook::domain::error::DomainError;
//! use signalbook::domain::score::ConfidenceScore;
//!
//! let result = ConfidenceScore::try_new(1.4, "too sure", chrono::Utc::now());
//! assert!(matches!(result, Err(DomainError::ScoreOutOfRange { .. })));
//! ```

use thiserror::Error;

/// Errors that occur when domain invariants are violated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Prices must be positive to compute returns.
    #[error("price must be positive, got {price}")]
    NonPositivePrice {
        /// The invalid price that was provided.
        price: rust_decimal::Decimal,
    },

    /// Position sizes must be positive.
    #[error("position size must be positive, got {size}")]
    NonPositiveSize {
        /// The invalid size that was provided.
        size: rust_decimal::Decimal,
    },

    /// A fill must deliver a positive token quantity.
    #[error("filled quantity must be positive, got {quantity}")]
    NonPositiveQuantity {
        /// The quantity reported by the fill.
        quantity: rust_decimal::Decimal,
    },

    /// Confidence scores live in `[0, 1]`.
    #[error("confidence score must be within [0, 1], got {score}")]
    ScoreOutOfRange {
        /// The score returned by the oracle.
        score: f64,
    },
}
