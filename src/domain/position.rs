//! Position types for the social-signal portfolio.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::DomainError;
use super::id::{AgentId, ContractAddress, Network, PositionId};
use super::money::{Price, Quantity, UsdAmount};
use super::signal::TradeSignal;

/// Lifecycle status of a position.
///
/// `Open -> PartialTaken -> Graduated` is the take-profit path and
/// `Open -> Closed` the stop-loss/eviction path. `PartialTaken -> Closed`
/// only happens through eviction before graduation completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Open,
    PartialTaken,
    Graduated,
    Closed,
}

impl PositionStatus {
    /// Returns true if the position is still held (anything but `Closed`).
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Closed)
    }

    /// Returns true if the position occupies a capacity slot.
    #[must_use]
    pub const fn counts_toward_cap(self) -> bool {
        matches!(self, Self::Open | Self::PartialTaken)
    }

    /// Returns true if the position is graduated.
    #[must_use]
    pub const fn is_graduated(self) -> bool {
        matches!(self, Self::Graduated)
    }

    /// Stable name used in logs and persistence.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::PartialTaken => "PARTIAL_TAKEN",
            Self::Graduated => "GRADUATED",
            Self::Closed => "CLOSED",
        }
    }

    /// Parse a persisted status name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "OPEN" => Some(Self::Open),
            "PARTIAL_TAKEN" => Some(Self::PartialTaken),
            "GRADUATED" => Some(Self::Graduated),
            "CLOSED" => Some(Self::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One open or historical holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    id: PositionId,
    trade_id: String,
    agent: AgentId,
    ticker: String,
    contract: ContractAddress,
    network: Network,
    source_reference_id: String,
    entry_price: Price,
    entry_timestamp: DateTime<Utc>,
    position_size_usd: UsdAmount,
    quantity: Quantity,
    status: PositionStatus,
    realized_pnl: UsdAmount,
    recovered_usd: UsdAmount,
    last_evaluated_at: Option<DateTime<Utc>>,
    exit_price: Option<Price>,
    closed_at: Option<DateTime<Utc>>,
    confidence: Option<f64>,
}

impl Position {
    /// Open a new position from a signal at the given fill price.
    ///
    /// # Errors
    ///
    /// Returns a [`DomainError`] if the price or size is not positive.
    pub fn open(
        id: PositionId,
        trade_id: impl Into<String>,
        signal: &TradeSignal,
        entry_price: Price,
        position_size_usd: UsdAmount,
        entry_timestamp: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if entry_price <= Decimal::ZERO {
            return Err(DomainError::NonPositivePrice { price: entry_price });
        }
        if position_size_usd <= Decimal::ZERO {
            return Err(DomainError::NonPositiveSize {
                size: position_size_usd,
            });
        }

        Ok(Self {
            id,
            trade_id: trade_id.into(),
            agent: signal.agent.clone(),
            ticker: signal.ticker.clone(),
            contract: signal.contract.clone(),
            network: signal.network.clone(),
            source_reference_id: signal.source_reference_id.clone(),
            entry_price,
            entry_timestamp,
            position_size_usd,
            quantity: position_size_usd / entry_price,
            status: PositionStatus::Open,
            realized_pnl: Decimal::ZERO,
            recovered_usd: Decimal::ZERO,
            last_evaluated_at: None,
            exit_price: None,
            closed_at: None,
            confidence: None,
        })
    }

    /// Attach the confidence score that admitted this position.
    #[must_use]
    pub fn with_confidence(mut self, score: f64) -> Self {
        self.confidence = Some(score);
        self
    }

    /// Replace the nominal `size / price` quantity with what the buy
    /// actually delivered.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NonPositiveQuantity`] for an empty fill.
    pub fn with_filled_quantity(mut self, quantity: Quantity) -> Result<Self, DomainError> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::NonPositiveQuantity { quantity });
        }
        self.quantity = quantity;
        Ok(self)
    }

    #[must_use]
    pub fn id(&self) -> PositionId {
        self.id
    }

    /// Persistence identifier (`T<yyyymmddHHMMSSffffff>`).
    #[must_use]
    pub fn trade_id(&self) -> &str {
        &self.trade_id
    }

    #[must_use]
    pub fn agent(&self) -> &AgentId {
        &self.agent
    }

    #[must_use]
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    #[must_use]
    pub fn contract(&self) -> &ContractAddress {
        &self.contract
    }

    #[must_use]
    pub fn network(&self) -> &Network {
        &self.network
    }

    #[must_use]
    pub fn source_reference_id(&self) -> &str {
        &self.source_reference_id
    }

    #[must_use]
    pub fn entry_price(&self) -> Price {
        self.entry_price
    }

    #[must_use]
    pub fn entry_timestamp(&self) -> DateTime<Utc> {
        self.entry_timestamp
    }

    /// Cost basis in USD.
    #[must_use]
    pub fn position_size_usd(&self) -> UsdAmount {
        self.position_size_usd
    }

    /// Tokens still held.
    #[must_use]
    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    #[must_use]
    pub fn status(&self) -> PositionStatus {
        self.status
    }

    #[must_use]
    pub fn realized_pnl(&self) -> UsdAmount {
        self.realized_pnl
    }

    /// USD returned to the quote balance by sales so far.
    #[must_use]
    pub fn recovered_usd(&self) -> UsdAmount {
        self.recovered_usd
    }

    #[must_use]
    pub fn last_evaluated_at(&self) -> Option<DateTime<Utc>> {
        self.last_evaluated_at
    }

    #[must_use]
    pub fn exit_price(&self) -> Option<Price> {
        self.exit_price
    }

    #[must_use]
    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    #[must_use]
    pub fn confidence(&self) -> Option<f64> {
        self.confidence
    }

    /// `(current - entry) / entry`.
    #[must_use]
    pub fn price_change_pct(&self, current: Price) -> Decimal {
        (current - self.entry_price) / self.entry_price
    }

    /// Value of the held remainder at `price`.
    #[must_use]
    pub fn market_value(&self, price: Price) -> UsdAmount {
        self.quantity * price
    }

    /// Held value plus everything already recovered, minus cost basis.
    #[must_use]
    pub fn total_pnl(&self, price: Price) -> UsdAmount {
        self.market_value(price) + self.recovered_usd - self.position_size_usd
    }

    /// Returns true if sales have returned at least the cost basis.
    #[must_use]
    pub fn capital_recovered(&self) -> bool {
        self.recovered_usd >= self.position_size_usd
    }

    /// Sell `sold_usd` worth at `price`, moving to `PartialTaken`.
    ///
    /// Returns the quantity sold. Callers validate the transition.
    pub(crate) fn apply_partial_sell(&mut self, sold_usd: UsdAmount, price: Price) -> Quantity {
        let sold_quantity = (sold_usd / price).min(self.quantity);
        let proceeds = sold_quantity * price;
        self.quantity -= sold_quantity;
        self.recovered_usd += proceeds;
        self.realized_pnl += proceeds - sold_quantity * self.entry_price;
        self.status = PositionStatus::PartialTaken;
        sold_quantity
    }

    /// Sell the whole remainder at `exit_price`, moving to `Closed`.
    ///
    /// Returns the sale proceeds.
    pub(crate) fn apply_close(&mut self, exit_price: Price, at: DateTime<Utc>) -> UsdAmount {
        let proceeds = self.quantity * exit_price;
        self.realized_pnl += proceeds - self.quantity * self.entry_price;
        self.recovered_usd += proceeds;
        self.quantity = Decimal::ZERO;
        self.exit_price = Some(exit_price);
        self.closed_at = Some(at);
        self.status = PositionStatus::Closed;
        proceeds
    }

    pub(crate) fn apply_graduation(&mut self) {
        self.status = PositionStatus::Graduated;
    }

    pub(crate) fn touch(&mut self, at: DateTime<Utc>) {
        self.last_evaluated_at = Some(at);
    }
}
