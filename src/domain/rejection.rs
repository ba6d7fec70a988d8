//! Rejection reasons reported when a candidate buy is dropped.
//!
//! Rejections are values, not errors: they are absorbed at the component
//! boundary, logged, and never stop the decision loop.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why the intake validator discarded a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    /// More than one ticker mentioned in the originating post.
    MultiTicker,
    /// A non-closed position already exists for `(agent, contract)`.
    AlreadyHeld,
    /// Token younger than the configured minimum age.
    TooYoung,
    /// Liquidity below the configured floor.
    LowLiquidity,
    /// Market cap outside the configured range.
    MarketCapOutOfRange,
    /// 24h volume below the configured minimum.
    LowVolume,
    /// No contract could be resolved for the ticker.
    NoContract,
    /// The market-data provider could not describe the token.
    MarketDataUnavailable,
}

impl RejectReason {
    /// Stable reason code used in logs and persistence.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MultiTicker => "MultiTicker",
            Self::AlreadyHeld => "AlreadyHeld",
            Self::TooYoung => "TooYoung",
            Self::LowLiquidity => "LowLiquidity",
            Self::MarketCapOutOfRange => "MarketCapOutOfRange",
            Self::LowVolume => "LowVolume",
            Self::NoContract => "NoContract",
            Self::MarketDataUnavailable => "MarketDataUnavailable",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which capacity bound refused a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapacityScope {
    /// The agent's own cap.
    Agent,
    /// The portfolio-wide cap.
    Global,
    /// Not enough quote balance for the position size.
    Balance,
}

impl fmt::Display for CapacityScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent => f.write_str("agent"),
            Self::Global => f.write_str("global"),
            Self::Balance => f.write_str("balance"),
        }
    }
}

/// Outcome of a candidate buy that did not result in a position.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalRejection {
    #[error("signal rejected: {reason}")]
    SignalRejected { reason: RejectReason },

    #[error("confidence {score:.3} below threshold {threshold:.3}")]
    LowConfidence { score: f64, threshold: f64 },

    #[error("scoring unavailable: {detail}")]
    ScoringUnavailable { detail: String },

    #[error("{scope} capacity exceeded")]
    CapacityExceeded { scope: CapacityScope },

    #[error("capacity unavailable after eviction: {detail}")]
    CapacityUnavailable { detail: String },

    #[error("buy execution failed: {detail}")]
    ExecutionFailed { detail: String },
}

impl SignalRejection {
    /// Shorthand for an intake rejection.
    #[must_use]
    pub const fn signal(reason: RejectReason) -> Self {
        Self::SignalRejected { reason }
    }

    /// Stable reason code used in logs.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::SignalRejected { reason } => reason.as_str(),
            Self::LowConfidence { .. } => "LowConfidence",
            Self::ScoringUnavailable { .. } => "ScoringUnavailable",
            Self::CapacityExceeded { .. } => "CapacityExceeded",
            Self::CapacityUnavailable { .. } => "CapacityUnavailable",
            Self::ExecutionFailed { .. } => "ExecutionFailed",
        }
    }
}
