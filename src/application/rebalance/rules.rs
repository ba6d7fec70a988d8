//! Per-position decision rules evaluated on every price refresh.

use rust_decimal::Decimal;

use crate::domain::{DecisionKind, ExitLevels, Position, PositionStatus, Price, Quantity};

/// Thresholds for the price-driven rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleConfig {
    /// Fractional gain that triggers take-profit (1.0 = +100%).
    pub take_profit_pct: Decimal,
    /// Fractional loss that triggers stop-loss (-0.5 = -50%).
    pub stop_loss_pct: Decimal,
}

impl RuleConfig {
    #[must_use]
    pub fn exit_levels(&self) -> ExitLevels {
        ExitLevels {
            take_profit_pct: self.take_profit_pct,
            stop_loss_pct: self.stop_loss_pct,
        }
    }
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            take_profit_pct: Decimal::ONE,
            stop_loss_pct: Decimal::new(-5, 1),
        }
    }
}

/// What the rules ask for on one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Hold,
    /// Sell `quantity` tokens, worth the cost basis at `price`.
    TakeProfit { quantity: Quantity, price: Price },
    Graduate,
    /// Sell the whole remainder at `price`.
    StopLoss { quantity: Quantity, price: Price },
}

impl Action {
    /// Decision kind for idempotency, `None` for `Hold`.
    #[must_use]
    pub fn kind(&self) -> Option<DecisionKind> {
        match self {
            Self::Hold => None,
            Self::TakeProfit { .. } => Some(DecisionKind::TakeProfit),
            Self::Graduate => Some(DecisionKind::Graduate),
            Self::StopLoss { .. } => Some(DecisionKind::StopLoss),
        }
    }

    /// Status the position must still be in for this action to apply.
    #[must_use]
    pub fn required_status(&self) -> Option<PositionStatus> {
        match self {
            Self::Hold => None,
            Self::TakeProfit { .. } | Self::StopLoss { .. } => Some(PositionStatus::Open),
            Self::Graduate => Some(PositionStatus::PartialTaken),
        }
    }
}

/// Evaluate the rules in priority order: take-profit, graduation, stop-loss.
///
/// At most one action is returned per evaluation. Graduated and closed
/// positions always hold; a partially taken position is never stop-lossed.
#[must_use]
pub fn evaluate(position: &Position, change_pct: Decimal, current_price: Price, config: &RuleConfig) -> Action {
    match position.status() {
        PositionStatus::Open if change_pct >= config.take_profit_pct => {
            if current_price <= Decimal::ZERO {
                return Action::Hold;
            }
            let quantity = (position.position_size_usd() / current_price).min(position.quantity());
            Action::TakeProfit {
                quantity,
                price: current_price,
            }
        }
        PositionStatus::PartialTaken if position.capital_recovered() => Action::Graduate,
        PositionStatus::Open if change_pct <= config.stop_loss_pct => Action::StopLoss {
            quantity: position.quantity(),
            price: current_price,
        },
        _ => Action::Hold,
    }
}
