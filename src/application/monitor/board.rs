//! Price history for tracked positions.
//!
//! The price monitor records every observation here before emitting a
//! change event. The rebalancing engine reads it to detect superseded
//! decisions and to compute trailing-window returns.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::domain::{Position, PositionId, Price};

/// One observed price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceObservation {
    pub at: DateTime<Utc>,
    pub price: Price,
}

/// Time-ordered price observations per position.
#[derive(Debug, Default)]
pub struct PriceBoard {
    history: RwLock<HashMap<PositionId, Vec<PriceObservation>>>,
    retention: Option<Duration>,
}

impl PriceBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop observations older than `retention`, keeping the newest one
    /// before the cutoff so window lookups stay answerable.
    #[must_use]
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            history: RwLock::new(HashMap::new()),
            retention: Some(retention),
        }
    }

    #[must_use]
    pub fn retention(&self) -> Option<Duration> {
        self.retention
    }

    /// Record an observation, keeping history sorted by time.
    pub fn record(&self, id: PositionId, price: Price, at: DateTime<Utc>) {
        let mut history = self.history.write();
        let series = history.entry(id).or_default();
        let index = series.partition_point(|o| o.at <= at);
        series.insert(index, PriceObservation { at, price });

        if let Some(retention) = self.retention {
            let cutoff = at - retention;
            let stale = series.partition_point(|o| o.at < cutoff);
            if stale > 1 {
                series.drain(..stale - 1);
            }
        }
    }

    /// Most recent observation.
    #[must_use]
    pub fn latest(&self, id: PositionId) -> Option<PriceObservation> {
        self.history.read().get(&id).and_then(|s| s.last().copied())
    }

    /// Latest observation at or before `at`.
    #[must_use]
    pub fn at_or_before(&self, id: PositionId, at: DateTime<Utc>) -> Option<PriceObservation> {
        let history = self.history.read();
        let series = history.get(&id)?;
        let index = series.partition_point(|o| o.at <= at);
        index.checked_sub(1).map(|i| series[i])
    }

    /// Earliest retained observation.
    #[must_use]
    pub fn earliest(&self, id: PositionId) -> Option<PriceObservation> {
        self.history.read().get(&id).and_then(|s| s.first().copied())
    }

    /// Returns true if an observation newer than `at` exists.
    #[must_use]
    pub fn has_newer(&self, id: PositionId, at: DateTime<Utc>) -> bool {
        self.latest(id).is_some_and(|o| o.at > at)
    }

    /// Return over the window ending at `now`.
    ///
    /// The base is the latest observation at or before `now - window`; a
    /// position younger than the window uses its entry price. The end is the
    /// latest observation at or before `now`, or the entry price when none.
    #[must_use]
    pub fn trailing_return(&self, position: &Position, now: DateTime<Utc>, window: Duration) -> Decimal {
        let id = position.id();
        let cutoff = now - window;
        let base = if position.entry_timestamp() >= cutoff {
            position.entry_price()
        } else {
            self.at_or_before(id, cutoff)
                .or_else(|| self.earliest(id))
                .map_or(position.entry_price(), |o| o.price)
        };
        let current = self
            .at_or_before(id, now)
            .map_or(position.entry_price(), |o| o.price);

        if base.is_zero() {
            Decimal::ZERO
        } else {
            (current - base) / base
        }
    }

    /// Forget a position (e.g. after it closed).
    pub fn forget(&self, id: PositionId) {
        self.history.write().remove(&id);
    }
}
