//! Trade persistence port.
//!
//! Write-mostly from the core's perspective: the engine appends trade
//! records, PnL snapshots and confidence scores. Reads exist for agent
//! performance summaries and audit.

use crate::domain::{AgentId, AgentSummary, ConfidenceScore, PnlSnapshot, TradeRecord, TradeSignal};
use crate::error::Result;

/// Append-only store for trades, PnL snapshots and scores.
pub trait TradeStore: Send + Sync {
    /// Append a trade record.
    fn append_trade(&self, record: &TradeRecord) -> Result<()>;

    /// Append a PnL snapshot.
    fn append_pnl_snapshot(&self, snapshot: &PnlSnapshot) -> Result<()>;

    /// Persist a confidence score for audit.
    fn record_score(&self, signal: &TradeSignal, score: &ConfidenceScore) -> Result<()>;

    /// All trade records for an agent, oldest first.
    fn trades(&self, agent: &AgentId) -> Result<Vec<TradeRecord>>;
}

/// Historical performance lookup for the confidence gate.
pub trait PerformanceSource: Send + Sync {
    /// Summary of the agent's past trades.
    fn agent_summary(&self, agent: &AgentId) -> Result<AgentSummary>;
}

impl<T: TradeStore + ?Sized> PerformanceSource for T {
    fn agent_summary(&self, agent: &AgentId) -> Result<AgentSummary> {
        let trades = self.trades(agent)?;
        Ok(AgentSummary::from_trades(agent, &trades))
    }
}
