//! Portfolio capacity configuration.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::ledger::LedgerLimits;

/// Per-agent position cap.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentCap {
    pub name: String,
    pub cap: usize,
}

/// `[portfolio]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioConfig {
    /// Maximum non-graduated positions across all agents.
    #[serde(default = "default_global_cap")]
    pub global_cap: usize,
    /// Cap for agents not listed in `agents`.
    #[serde(default = "default_agent_cap")]
    pub default_agent_cap: usize,
    /// Quote amount spent on each buy.
    #[serde(default = "default_position_size_usd")]
    pub position_size_usd: Decimal,
    #[serde(default = "default_initial_balance_usd")]
    pub initial_balance_usd: Decimal,
    #[serde(default)]
    pub agents: Vec<AgentCap>,
}

const fn default_global_cap() -> usize {
    25
}

const fn default_agent_cap() -> usize {
    5
}

fn default_position_size_usd() -> Decimal {
    Decimal::from(100)
}

fn default_initial_balance_usd() -> Decimal {
    Decimal::from(2500)
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            global_cap: default_global_cap(),
            default_agent_cap: default_agent_cap(),
            position_size_usd: default_position_size_usd(),
            initial_balance_usd: default_initial_balance_usd(),
            agents: Vec::new(),
        }
    }
}

impl PortfolioConfig {
    /// Ledger limits for this portfolio.
    #[must_use]
    pub fn ledger_limits(&self) -> LedgerLimits {
        self.agents.iter().fold(
            LedgerLimits {
                global_cap: self.global_cap,
                default_agent_cap: self.default_agent_cap,
                agent_caps: Default::default(),
                initial_balance_usd: self.initial_balance_usd,
            },
            |limits, agent| limits.with_agent(agent.name.as_str(), agent.cap),
        )
    }
}
