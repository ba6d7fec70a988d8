//! Worst-performer selection for evictions.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::application::monitor::PriceBoard;
use crate::domain::Position;

/// An eviction candidate with its trailing return.
#[derive(Debug, Clone)]
pub struct Ranked<'a> {
    pub position: &'a Position,
    pub trailing_return: Decimal,
}

/// Pick the strictly worst trailing performer among non-graduated
/// active positions.
///
/// Ties resolve to the earliest entry, then the lowest position id.
#[must_use]
pub fn worst_performer<'a>(
    candidates: impl IntoIterator<Item = &'a Position>,
    board: &PriceBoard,
    now: DateTime<Utc>,
    window: Duration,
) -> Option<Ranked<'a>> {
    candidates
        .into_iter()
        .filter(|p| p.status().counts_toward_cap())
        .map(|position| Ranked {
            position,
            trailing_return: board.trailing_return(position, now, window),
        })
        .min_by(|a, b| {
            a.trailing_return
                .cmp(&b.trailing_return)
                .then_with(|| a.position.entry_timestamp().cmp(&b.position.entry_timestamp()))
                .then_with(|| a.position.id().cmp(&b.position.id()))
        })
}
