//! Trade records, PnL snapshots and per-agent performance summaries.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{AgentId, ContractAddress, Network, PositionId};
use super::money::{Price, Quantity, UsdAmount};
use super::position::{Position, PositionStatus};

/// Why a position left the book, fully or partially.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    ScheduledEviction,
    OverflowEviction,
}

impl ExitReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TakeProfit => "take_profit",
            Self::StopLoss => "stop_loss",
            Self::ScheduledEviction => "scheduled_eviction",
            Self::OverflowEviction => "overflow_eviction",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "take_profit" => Some(Self::TakeProfit),
            "stop_loss" => Some(Self::StopLoss),
            "scheduled_eviction" => Some(Self::ScheduledEviction),
            "overflow_eviction" => Some(Self::OverflowEviction),
            _ => None,
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle step a trade record documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeAction {
    Open,
    PartialSell,
    Graduate,
    Close,
}

impl TradeAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::PartialSell => "partial_sell",
            Self::Graduate => "graduate",
            Self::Close => "close",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(Self::Open),
            "partial_sell" => Some(Self::PartialSell),
            "graduate" => Some(Self::Graduate),
            "close" => Some(Self::Close),
            _ => None,
        }
    }
}

/// Side of a position. Signals only ever open longs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PositionSide {
    #[default]
    Long,
}

impl PositionSide {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Long => "long",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        (value == "long").then_some(Self::Long)
    }
}

/// Build a trade id of the form `T<yyyymmddHHMMSSffffff>`.
#[must_use]
pub fn trade_id_at(at: DateTime<Utc>) -> String {
    at.format("T%Y%m%d%H%M%S%6f").to_string()
}

/// Append-only record mirroring one row of the Trades table.
///
/// A position produces one record per lifecycle step; the latest record for a
/// `trade_id` reflects the position's current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: String,
    pub position_id: PositionId,
    pub action: TradeAction,
    pub agent: AgentId,
    pub source_reference_id: String,
    pub ticker: String,
    pub contract: ContractAddress,
    pub network: Network,
    pub direction: PositionSide,
    pub recorded_at: DateTime<Utc>,
    pub entry_timestamp: DateTime<Utc>,
    pub entry_price: Price,
    pub position_size_usd: UsdAmount,
    pub quantity: Quantity,
    pub stop_loss_price: Price,
    pub take_profit_price: Price,
    pub status: PositionStatus,
    pub exit_price: Option<Price>,
    pub exit_timestamp: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
    pub pnl_amount: UsdAmount,
    pub pnl_percentage: Decimal,
    pub tx_hash: Option<String>,
    pub confidence: Option<f64>,
}

/// Price levels at which the rules fire, relative to entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitLevels {
    pub take_profit_pct: Decimal,
    pub stop_loss_pct: Decimal,
}

impl TradeRecord {
    /// Record the current state of `position` after `action`.
    #[must_use]
    pub fn from_position(
        position: &Position,
        action: TradeAction,
        levels: ExitLevels,
        exit_reason: Option<ExitReason>,
        tx_hash: Option<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let entry = position.entry_price();
        let size = position.position_size_usd();
        let pnl_percentage = if size.is_zero() {
            Decimal::ZERO
        } else {
            position.realized_pnl() / size
        };

        Self {
            trade_id: position.trade_id().to_string(),
            position_id: position.id(),
            action,
            agent: position.agent().clone(),
            source_reference_id: position.source_reference_id().to_string(),
            ticker: position.ticker().to_string(),
            contract: position.contract().clone(),
            network: position.network().clone(),
            direction: PositionSide::Long,
            recorded_at,
            entry_timestamp: position.entry_timestamp(),
            entry_price: entry,
            position_size_usd: size,
            quantity: position.quantity(),
            stop_loss_price: entry * (Decimal::ONE + levels.stop_loss_pct),
            take_profit_price: entry * (Decimal::ONE + levels.take_profit_pct),
            status: position.status(),
            exit_price: position.exit_price(),
            exit_timestamp: position.closed_at(),
            exit_reason,
            pnl_amount: position.realized_pnl(),
            pnl_percentage,
            tx_hash,
            confidence: position.confidence(),
        }
    }
}

/// One row of the PnL snapshot table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnlRow {
    pub position_id: PositionId,
    pub agent: AgentId,
    pub ticker: String,
    pub contract: ContractAddress,
    pub status: PositionStatus,
    pub entry_time: DateTime<Utc>,
    pub entry_price: Price,
    pub current_price: Price,
    pub price_change_pct: Decimal,
    pub invested_usd: UsdAmount,
    pub current_value_usd: UsdAmount,
    pub pnl_usd: UsdAmount,
}

/// Totals for a group of PnL rows.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PnlTotals {
    pub invested_usd: UsdAmount,
    pub current_value_usd: UsdAmount,
    pub pnl_usd: UsdAmount,
}

impl PnlTotals {
    fn add(&mut self, row: &PnlRow) {
        self.invested_usd += row.invested_usd;
        self.current_value_usd += row.current_value_usd;
        self.pnl_usd += row.pnl_usd;
    }

    /// PnL as a fraction of invested capital.
    #[must_use]
    pub fn pnl_pct(&self) -> Decimal {
        if self.invested_usd.is_zero() {
            Decimal::ZERO
        } else {
            self.pnl_usd / self.invested_usd
        }
    }
}

/// Mark-to-market view of every active position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnlSnapshot {
    pub taken_at: DateTime<Utc>,
    pub rows: Vec<PnlRow>,
    pub agent_totals: BTreeMap<AgentId, PnlTotals>,
    pub grand_total: PnlTotals,
}

impl PnlSnapshot {
    /// Build a snapshot from rows, computing per-agent and grand totals.
    #[must_use]
    pub fn from_rows(taken_at: DateTime<Utc>, rows: Vec<PnlRow>) -> Self {
        let mut agent_totals: BTreeMap<AgentId, PnlTotals> = BTreeMap::new();
        let mut grand_total = PnlTotals::default();
        for row in &rows {
            agent_totals.entry(row.agent.clone()).or_default().add(row);
            grand_total.add(row);
        }
        Self {
            taken_at,
            rows,
            agent_totals,
            grand_total,
        }
    }
}

/// Historical performance for one agent, used by the confidence gate.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentSummary {
    pub agent: Option<AgentId>,
    pub open_positions: usize,
    pub closed_positions: usize,
    pub wins: usize,
    pub realized_pnl: UsdAmount,
}

impl AgentSummary {
    /// Summarize trades for `agent`, using the latest record per trade id.
    #[must_use]
    pub fn from_trades(agent: &AgentId, trades: &[TradeRecord]) -> Self {
        let mut latest: BTreeMap<&str, &TradeRecord> = BTreeMap::new();
        for trade in trades.iter().filter(|t| &t.agent == agent) {
            match latest.get(trade.trade_id.as_str()) {
                Some(existing) if existing.recorded_at > trade.recorded_at => {}
                _ => {
                    latest.insert(trade.trade_id.as_str(), trade);
                }
            }
        }

        let mut summary = Self {
            agent: Some(agent.clone()),
            ..Self::default()
        };
        for trade in latest.values() {
            summary.realized_pnl += trade.pnl_amount;
            if trade.status == PositionStatus::Closed {
                summary.closed_positions += 1;
                if trade.pnl_amount > Decimal::ZERO {
                    summary.wins += 1;
                }
            } else {
                summary.open_positions += 1;
            }
        }
        summary
    }

    /// Fraction of closed positions that made money, 0 when none closed.
    #[must_use]
    pub fn win_rate(&self) -> f64 {
        if self.closed_positions == 0 {
            0.0
        } else {
            self.wins as f64 / self.closed_positions as f64
        }
    }
}
