//! PnL snapshot computation.

use chrono::{DateTime, Utc};

use crate::application::monitor::PriceBoard;
use crate::domain::{PnlRow, PnlSnapshot, PortfolioState};

/// Mark every active position to its latest price at or before `at`.
///
/// Positions without observations are marked at their entry price.
#[must_use]
pub fn pnl_snapshot(state: &PortfolioState, board: &PriceBoard, at: DateTime<Utc>) -> PnlSnapshot {
    let rows = state
        .active_positions()
        .map(|position| {
            let current_price = board
                .at_or_before(position.id(), at)
                .map_or(position.entry_price(), |o| o.price);
            PnlRow {
                position_id: position.id(),
                agent: position.agent().clone(),
                ticker: position.ticker().to_string(),
                contract: position.contract().clone(),
                status: position.status(),
                entry_time: position.entry_timestamp(),
                entry_price: position.entry_price(),
                current_price,
                price_change_pct: position.price_change_pct(current_price),
                invested_usd: position.position_size_usd(),
                current_value_usd: position.market_value(current_price) + position.recovered_usd(),
                pnl_usd: position.total_pnl(current_price),
            }
        })
        .collect();

    PnlSnapshot::from_rows(at, rows)
}
