//! Scoring oracle port.
//!
//! The confidence gate hands the oracle a bundle of historical performance
//! and live token metrics and receives a score in `[0, 1]`. The gate treats
//! the oracle as opaque and potentially unavailable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::market::TokenMetrics;
use crate::domain::{AgentSummary, TradeSignal};
use crate::error::Result;

/// Input bundle for one scoring request.
#[derive(Debug, Clone)]
pub struct ScoringRequest {
    pub signal: TradeSignal,
    pub performance: AgentSummary,
    pub metrics: TokenMetrics,
    /// Number of recent posts mentioning the ticker, when known.
    pub mention_volume: Option<u64>,
}

/// Raw oracle response before range validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub score: f64,
    #[serde(default)]
    pub rationale: String,
}

/// External service that rates a candidate trade.
#[async_trait]
pub trait ScoringOracle: Send + Sync {
    /// Oracle name for logging.
    fn name(&self) -> &'static str;

    /// Score a candidate trade.
    ///
    /// # Errors
    ///
    /// Returns an error if the oracle is unreachable or returns an
    /// unparseable response.
    async fn score(&self, request: &ScoringRequest) -> Result<ScoreResponse>;
}
