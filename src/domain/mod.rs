//! Venue-agnostic domain types.

pub mod decision;
pub mod error;
pub mod id;
pub mod money;
pub mod portfolio;
pub mod position;
pub mod rejection;
pub mod score;
pub mod signal;
pub mod trade;

pub use decision::{DecisionKey, DecisionKind, PriceChangeEvent, TradeDirection};
pub use error::DomainError;
pub use id::{AgentId, ContractAddress, Network, PositionId};
pub use money::{Price, Quantity, UsdAmount};
pub use portfolio::PortfolioState;
pub use position::{Position, PositionStatus};
pub use rejection::{CapacityScope, RejectReason, SignalRejection};
pub use score::ConfidenceScore;
pub use signal::{ContractRef, SignalEvent, TradeSignal};
pub use trade::{
    AgentSummary, ExitLevels, ExitReason, PnlRow, PnlSnapshot, PnlTotals, PositionSide, TradeAction,
    TradeRecord,
};
