//! Row types and conversions to domain records.
//!
//! Decimals are stored as text to keep them exact; timestamps as RFC 3339.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;

use super::schema::{confidence_scores, pnl_rows, pnl_snapshots, trades};
use crate::domain::{
    ConfidenceScore, ExitReason, PnlRow, PnlSnapshot, PositionId, PositionSide, PositionStatus,
    TradeAction, TradeRecord, TradeSignal,
};
use crate::error::{Error, Result};

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = trades)]
pub struct NewTradeRow {
    pub trade_id: String,
    pub position_id: i64,
    pub action: String,
    pub agent: String,
    pub source_reference_id: String,
    pub ticker: String,
    pub contract: String,
    pub network: String,
    pub direction: String,
    pub recorded_at: String,
    pub entry_timestamp: String,
    pub entry_price: String,
    pub position_size_usd: String,
    pub quantity: String,
    pub stop_loss_price: String,
    pub take_profit_price: String,
    pub status: String,
    pub exit_price: Option<String>,
    pub exit_timestamp: Option<String>,
    pub exit_reason: Option<String>,
    pub pnl_amount: String,
    pub pnl_percentage: String,
    pub tx_hash: Option<String>,
    pub confidence: Option<f64>,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = trades)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TradeRow {
    pub id: Option<i32>,
    pub trade_id: String,
    pub position_id: i64,
    pub action: String,
    pub agent: String,
    pub source_reference_id: String,
    pub ticker: String,
    pub contract: String,
    pub network: String,
    pub direction: String,
    pub recorded_at: String,
    pub entry_timestamp: String,
    pub entry_price: String,
    pub position_size_usd: String,
    pub quantity: String,
    pub stop_loss_price: String,
    pub take_profit_price: String,
    pub status: String,
    pub exit_price: Option<String>,
    pub exit_timestamp: Option<String>,
    pub exit_reason: Option<String>,
    pub pnl_amount: String,
    pub pnl_percentage: String,
    pub tx_hash: Option<String>,
    pub confidence: Option<f64>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = pnl_snapshots)]
pub struct NewSnapshotRow {
    pub taken_at: String,
    pub positions: i32,
    pub invested_usd: String,
    pub current_value_usd: String,
    pub pnl_usd: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = pnl_rows)]
pub struct NewPnlRow {
    pub snapshot_id: i32,
    pub position_id: i64,
    pub agent: String,
    pub ticker: String,
    pub contract: String,
    pub status: String,
    pub entry_time: String,
    pub entry_price: String,
    pub current_price: String,
    pub price_change_pct: String,
    pub invested_usd: String,
    pub current_value_usd: String,
    pub pnl_usd: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = confidence_scores)]
pub struct NewScoreRow {
    pub agent: String,
    pub source_reference_id: String,
    pub ticker: String,
    pub contract: String,
    pub network: String,
    pub score: f64,
    pub rationale: String,
    pub evaluated_at: String,
}

fn position_id_column(id: PositionId) -> i64 {
    i64::try_from(id.value()).unwrap_or(i64::MAX)
}

impl From<&TradeRecord> for NewTradeRow {
    fn from(r: &TradeRecord) -> Self {
        Self {
            trade_id: r.trade_id.clone(),
            position_id: position_id_column(r.position_id),
            action: r.action.as_str().to_string(),
            agent: r.agent.to_string(),
            source_reference_id: r.source_reference_id.clone(),
            ticker: r.ticker.clone(),
            contract: r.contract.to_string(),
            network: r.network.to_string(),
            direction: r.direction.as_str().to_string(),
            recorded_at: r.recorded_at.to_rfc3339(),
            entry_timestamp: r.entry_timestamp.to_rfc3339(),
            entry_price: r.entry_price.to_string(),
            position_size_usd: r.position_size_usd.to_string(),
            quantity: r.quantity.to_string(),
            stop_loss_price: r.stop_loss_price.to_string(),
            take_profit_price: r.take_profit_price.to_string(),
            status: r.status.as_str().to_string(),
            exit_price: r.exit_price.map(|p| p.to_string()),
            exit_timestamp: r.exit_timestamp.map(|t| t.to_rfc3339()),
            exit_reason: r.exit_reason.map(|e| e.as_str().to_string()),
            pnl_amount: r.pnl_amount.to_string(),
            pnl_percentage: r.pnl_percentage.to_string(),
            tx_hash: r.tx_hash.clone(),
            confidence: r.confidence,
        }
    }
}

fn decimal(column: &str, value: &str) -> Result<Decimal> {
    Decimal::from_str(value).map_err(|e| Error::Parse(format!("{column}: {e}")))
}

fn timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Parse(format!("{column}: {e}")))
}

impl TryFrom<TradeRow> for TradeRecord {
    type Error = Error;

    fn try_from(row: TradeRow) -> Result<Self> {
        Ok(Self {
            position_id: PositionId::new(u64::try_from(row.position_id).unwrap_or_default()),
            action: TradeAction::parse(&row.action)
                .ok_or_else(|| Error::Parse(format!("action: {}", row.action)))?,
            agent: row.agent.into(),
            ticker: row.ticker,
            contract: row.contract.into(),
            network: row.network.into(),
            direction: PositionSide::parse(&row.direction)
                .ok_or_else(|| Error::Parse(format!("direction: {}", row.direction)))?,
            recorded_at: timestamp("recorded_at", &row.recorded_at)?,
            entry_timestamp: timestamp("entry_timestamp", &row.entry_timestamp)?,
            entry_price: decimal("entry_price", &row.entry_price)?,
            position_size_usd: decimal("position_size_usd", &row.position_size_usd)?,
            quantity: decimal("quantity", &row.quantity)?,
            stop_loss_price: decimal("stop_loss_price", &row.stop_loss_price)?,
            take_profit_price: decimal("take_profit_price", &row.take_profit_price)?,
            status: PositionStatus::parse(&row.status)
                .ok_or_else(|| Error::Parse(format!("status: {}", row.status)))?,
            exit_price: row
                .exit_price
                .as_deref()
                .map(|p| decimal("exit_price", p))
                .transpose()?,
            exit_timestamp: row
                .exit_timestamp
                .as_deref()
                .map(|t| timestamp("exit_timestamp", t))
                .transpose()?,
            exit_reason: row.exit_reason.as_deref().and_then(ExitReason::parse),
            pnl_amount: decimal("pnl_amount", &row.pnl_amount)?,
            pnl_percentage: decimal("pnl_percentage", &row.pnl_percentage)?,
            tx_hash: row.tx_hash,
            confidence: row.confidence,
            trade_id: row.trade_id,
            source_reference_id: row.source_reference_id,
        })
    }
}

impl From<&PnlSnapshot> for NewSnapshotRow {
    fn from(s: &PnlSnapshot) -> Self {
        Self {
            taken_at: s.taken_at.to_rfc3339(),
            positions: i32::try_from(s.rows.len()).unwrap_or(i32::MAX),
            invested_usd: s.grand_total.invested_usd.to_string(),
            current_value_usd: s.grand_total.current_value_usd.to_string(),
            pnl_usd: s.grand_total.pnl_usd.to_string(),
        }
    }
}

impl NewPnlRow {
    pub fn new(snapshot_id: i32, row: &PnlRow) -> Self {
        Self {
            snapshot_id,
            position_id: position_id_column(row.position_id),
            agent: row.agent.to_string(),
            ticker: row.ticker.clone(),
            contract: row.contract.to_string(),
            status: row.status.as_str().to_string(),
            entry_time: row.entry_time.to_rfc3339(),
            entry_price: row.entry_price.to_string(),
            current_price: row.current_price.to_string(),
            price_change_pct: row.price_change_pct.to_string(),
            invested_usd: row.invested_usd.to_string(),
            current_value_usd: row.current_value_usd.to_string(),
            pnl_usd: row.pnl_usd.to_string(),
        }
    }
}

impl NewScoreRow {
    pub fn new(signal: &TradeSignal, score: &ConfidenceScore) -> Self {
        Self {
            agent: signal.agent.to_string(),
            source_reference_id: signal.source_reference_id.clone(),
            ticker: signal.ticker.clone(),
            contract: signal.contract.to_string(),
            network: signal.network.to_string(),
            score: score.score(),
            rationale: score.rationale().to_string(),
            evaluated_at: score.evaluated_at().to_rfc3339(),
        }
    }
}
