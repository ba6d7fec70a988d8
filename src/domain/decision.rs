//! Rebalancing decisions and the events that drive them.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::PositionId;
use super::money::Price;

/// Kind of ledger-mutating decision the engine can take on a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DecisionKind {
    TakeProfit,
    Graduate,
    StopLoss,
    ScheduledEviction,
    OverflowEviction,
}

impl DecisionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TakeProfit => "take_profit",
            Self::Graduate => "graduate",
            Self::StopLoss => "stop_loss",
            Self::ScheduledEviction => "scheduled_eviction",
            Self::OverflowEviction => "overflow_eviction",
        }
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Idempotency key for one logical decision.
///
/// The engine never applies two ledger mutations for the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DecisionKey {
    pub position: PositionId,
    pub kind: DecisionKind,
    pub trigger: DateTime<Utc>,
}

impl DecisionKey {
    #[must_use]
    pub const fn new(position: PositionId, kind: DecisionKind, trigger: DateTime<Utc>) -> Self {
        Self {
            position,
            kind,
            trigger,
        }
    }
}

impl fmt::Display for DecisionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.position, self.kind, self.trigger.to_rfc3339())
    }
}

/// Emitted by the price monitor for every refreshed position.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceChangeEvent {
    pub position_id: PositionId,
    /// `(current - entry) / entry`, where 1.0 is +100%.
    pub price_change_pct: Decimal,
    pub current_price: Price,
    pub observed_at: DateTime<Utc>,
}

/// Swap direction relative to the quote token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeDirection {
    /// Spend quote token to acquire the position token.
    Buy,
    /// Sell the position token for quote token.
    Sell,
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => f.write_str("buy"),
            Self::Sell => f.write_str("sell"),
        }
    }
}
