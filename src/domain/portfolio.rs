//! Point-in-time portfolio view handed out by the position ledger.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::id::{AgentId, ContractAddress, PositionId};
use super::money::UsdAmount;
use super::position::{Position, PositionStatus};

/// Consistent snapshot of ledger state.
///
/// Snapshots are copies; mutating the ledger afterwards does not affect them.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioState {
    pub taken_at: DateTime<Utc>,
    pub positions: Vec<Position>,
    /// Non-graduated active positions per agent.
    pub open_counts: BTreeMap<AgentId, usize>,
    pub agent_caps: BTreeMap<AgentId, usize>,
    pub default_agent_cap: usize,
    pub global_cap: usize,
    /// Capacity slots held by in-flight buys.
    pub reserved: BTreeMap<AgentId, usize>,
    pub balance_usd: UsdAmount,
    pub halted: bool,
}

impl PortfolioState {
    /// Cap configured for `agent`, falling back to the default cap.
    #[must_use]
    pub fn agent_cap(&self, agent: &AgentId) -> usize {
        self.agent_caps
            .get(agent)
            .copied()
            .unwrap_or(self.default_agent_cap)
    }

    /// Non-graduated active positions held for `agent`.
    #[must_use]
    pub fn open_count(&self, agent: &AgentId) -> usize {
        self.open_counts.get(agent).copied().unwrap_or(0)
    }

    /// Non-graduated active positions across all agents.
    #[must_use]
    pub fn global_count(&self) -> usize {
        self.open_counts.values().sum()
    }

    #[must_use]
    pub fn graduated_count(&self) -> usize {
        self.positions
            .iter()
            .filter(|p| p.status().is_graduated())
            .count()
    }

    /// Returns true if `agent` has no free slot, counting reservations.
    #[must_use]
    pub fn agent_at_cap(&self, agent: &AgentId) -> bool {
        let reserved = self.reserved.get(agent).copied().unwrap_or(0);
        self.open_count(agent) + reserved >= self.agent_cap(agent)
    }

    /// Iterator over positions that are not closed.
    pub fn active_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter().filter(|p| p.status().is_active())
    }

    /// Non-graduated active positions for one agent.
    pub fn capped_positions<'a>(
        &'a self,
        agent: &'a AgentId,
    ) -> impl Iterator<Item = &'a Position> + 'a {
        self.positions
            .iter()
            .filter(move |p| p.agent() == agent && p.status().counts_toward_cap())
    }

    #[must_use]
    pub fn position(&self, id: PositionId) -> Option<&Position> {
        self.positions.iter().find(|p| p.id() == id)
    }

    /// Returns true if a non-closed position exists for `(agent, contract)`.
    #[must_use]
    pub fn holds(&self, agent: &AgentId, contract: &ContractAddress) -> bool {
        self.active_positions()
            .any(|p| p.agent() == agent && p.contract() == contract)
    }

    /// Count positions in the given status.
    #[must_use]
    pub fn count_status(&self, status: PositionStatus) -> usize {
        self.positions.iter().filter(|p| p.status() == status).count()
    }
}
