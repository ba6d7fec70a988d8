//! Signal types: raw intake events and validated trade signals.

use serde::{Deserialize, Serialize};

use super::id::{AgentId, ContractAddress, Network};

/// A token contract resolved for a ticker on a specific network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractRef {
    /// Ticker symbol as mentioned (without `$`).
    pub ticker: String,
    /// Token contract address.
    pub contract: ContractAddress,
    /// Network the contract lives on.
    pub network: Network,
}

impl ContractRef {
    pub fn new(
        ticker: impl Into<String>,
        contract: impl Into<ContractAddress>,
        network: impl Into<Network>,
    ) -> Self {
        Self {
            ticker: normalize_ticker(&ticker.into()),
            contract: contract.into(),
            network: network.into(),
        }
    }
}

/// Raw intake event produced by the feed listener.
///
/// `contracts` is optional: when the listener already resolved the mention to
/// contract addresses they are used as-is, otherwise the validator asks the
/// market-data provider to resolve the ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub agent: AgentId,
    #[serde(alias = "sourceReferenceId")]
    pub source_reference_id: String,
    #[serde(alias = "mentionedTickers")]
    pub mentioned_tickers: Vec<String>,
    #[serde(default)]
    pub contracts: Vec<ContractRef>,
}

impl SignalEvent {
    /// Create an event with no pre-resolved contracts.
    pub fn new(
        agent: impl Into<AgentId>,
        source_reference_id: impl Into<String>,
        mentioned_tickers: Vec<String>,
    ) -> Self {
        Self {
            agent: agent.into(),
            source_reference_id: source_reference_id.into(),
            mentioned_tickers,
            contracts: Vec::new(),
        }
    }

    /// Attach a pre-resolved contract candidate.
    #[must_use]
    pub fn with_contract(mut self, contract: ContractRef) -> Self {
        self.contracts.push(contract);
        self
    }

    /// Number of distinct tickers the event refers to, counting both the
    /// mentions and any pre-resolved contracts.
    #[must_use]
    pub fn mentioned_ticker_count(&self) -> usize {
        let mut tickers: Vec<String> = self
            .mentioned_tickers
            .iter()
            .chain(self.contracts.iter().map(|c| &c.ticker))
            .map(|t| normalize_ticker(t))
            .filter(|t| !t.is_empty())
            .collect();
        tickers.sort();
        tickers.dedup();
        tickers.len()
    }
}

/// A candidate buy resolved to a single contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub agent: AgentId,
    pub source_reference_id: String,
    pub ticker: String,
    pub contract: ContractAddress,
    pub network: Network,
    pub mentioned_ticker_count: usize,
}

impl TradeSignal {
    /// Build a single-ticker signal for the given contract.
    pub fn new(
        agent: impl Into<AgentId>,
        source_reference_id: impl Into<String>,
        contract: ContractRef,
    ) -> Self {
        Self {
            agent: agent.into(),
            source_reference_id: source_reference_id.into(),
            ticker: contract.ticker,
            contract: contract.contract,
            network: contract.network,
            mentioned_ticker_count: 1,
        }
    }

    /// The contract this signal targets.
    #[must_use]
    pub fn contract_ref(&self) -> ContractRef {
        ContractRef {
            ticker: self.ticker.clone(),
            contract: self.contract.clone(),
            network: self.network.clone(),
        }
    }
}

/// Strip a leading `$` and uppercase the ticker.
#[must_use]
pub fn normalize_ticker(raw: &str) -> String {
    raw.trim().trim_start_matches('$').to_ascii_uppercase()
}
