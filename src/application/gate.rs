//! Confidence gate.
//!
//! Bundles the agent's historical performance with live token metrics, asks
//! the scoring oracle for a score under a bounded timeout, and admits the
//! signal only when the score clears the threshold. Fail-closed: a slow,
//! unreachable or nonsensical oracle rejects the signal.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::domain::{AgentSummary, ConfidenceScore, SignalRejection, TradeSignal};
use crate::port::{PerformanceSource, ScoringOracle, ScoringRequest, TokenMetrics, TradeStore};

/// Gate settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateConfig {
    pub threshold: f64,
    pub timeout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            timeout: Duration::from_secs(20),
        }
    }
}

/// Admission check in front of the ledger.
pub struct ConfidenceGate {
    oracle: Arc<dyn ScoringOracle>,
    performance: Arc<dyn PerformanceSource>,
    store: Arc<dyn TradeStore>,
    config: GateConfig,
}

impl ConfidenceGate {
    #[must_use]
    pub fn new(
        oracle: Arc<dyn ScoringOracle>,
        performance: Arc<dyn PerformanceSource>,
        store: Arc<dyn TradeStore>,
        config: GateConfig,
    ) -> Self {
        Self {
            oracle,
            performance,
            store,
            config,
        }
    }

    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    /// Score a validated signal and decide admission.
    ///
    /// # Errors
    ///
    /// Returns [`SignalRejection::ScoringUnavailable`] when the oracle fails,
    /// times out or answers out of range, and
    /// [`SignalRejection::LowConfidence`] when the score is below threshold.
    pub async fn admit(
        &self,
        signal: &TradeSignal,
        metrics: &TokenMetrics,
    ) -> Result<ConfidenceScore, SignalRejection> {
        let performance = self
            .performance
            .agent_summary(&signal.agent)
            .unwrap_or_else(|e| {
                warn!(agent = %signal.agent, error = %e, "Agent history unavailable, scoring without it");
                AgentSummary {
                    agent: Some(signal.agent.clone()),
                    ..AgentSummary::default()
                }
            });

        let request = ScoringRequest {
            signal: signal.clone(),
            performance,
            metrics: metrics.clone(),
            mention_volume: None,
        };

        let response = match tokio::time::timeout(self.config.timeout, self.oracle.score(&request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(oracle = self.oracle.name(), ticker = %signal.ticker, error = %e, "Scoring oracle failed");
                return Err(SignalRejection::ScoringUnavailable {
                    detail: e.to_string(),
                });
            }
            Err(_) => {
                warn!(
                    oracle = self.oracle.name(),
                    ticker = %signal.ticker,
                    timeout_secs = self.config.timeout.as_secs(),
                    "Scoring oracle timed out"
                );
                return Err(SignalRejection::ScoringUnavailable {
                    detail: format!("timed out after {:?}", self.config.timeout),
                });
            }
        };

        let score = ConfidenceScore::try_new(response.score, response.rationale, Utc::now())
            .map_err(|e| SignalRejection::ScoringUnavailable {
                detail: e.to_string(),
            })?;

        if let Err(e) = self.store.record_score(signal, &score) {
            warn!(ticker = %signal.ticker, error = %e, "Failed to persist confidence score");
        }

        if score.admits(self.config.threshold) {
            debug!(
                agent = %signal.agent,
                ticker = %signal.ticker,
                score = score.score(),
                "Signal admitted"
            );
            Ok(score)
        } else {
            info!(
                agent = %signal.agent,
                ticker = %signal.ticker,
                score = score.score(),
                threshold = self.config.threshold,
                "Signal below confidence threshold"
            );
            Err(SignalRejection::LowConfidence {
                score: score.score(),
                threshold: self.config.threshold,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::outbound::memory::MemoryStore;
    use crate::testkit::domain;
    use crate::testkit::oracle::ScriptedOracle;
    use rust_decimal_macros::dec;

    fn gate(oracle: ScriptedOracle, timeout: Duration) -> (ConfidenceGate, Arc<ScriptedOracle>, Arc<MemoryStore>) {
        let oracle = Arc::new(oracle);
        let store = Arc::new(MemoryStore::new());
        let gate = ConfidenceGate::new(
            oracle.clone(),
            store.clone(),
            store.clone(),
            GateConfig {
                threshold: 0.7,
                timeout,
            },
        );
        (gate, oracle, store)
    }

    #[tokio::test]
    async fn score_at_threshold_is_admitted() {
        let (gate, oracle, store) = gate(ScriptedOracle::fixed(0.7), Duration::from_secs(1));
        let signal = domain::signal("alpha", "PEPE");

        let score = gate.admit(&signal, &domain::metrics("PEPE", dec!(1))).await.unwrap();
        assert!((score.score() - 0.7).abs() < f64::EPSILON);
        assert_eq!(store.scores().len(), 1);

        let request = &oracle.requests()[0];
        assert_eq!(request.signal, signal);
        assert_eq!(request.performance.agent.as_ref().map(|a| a.as_str()), Some("alpha"));
    }

    #[tokio::test]
    async fn low_score_is_rejected_but_recorded() {
        let (gate, _, store) = gate(ScriptedOracle::fixed(0.4), Duration::from_secs(1));
        let err = gate
            .admit(&domain::signal("alpha", "PEPE"), &domain::metrics("PEPE", dec!(1)))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "LowConfidence");
        assert_eq!(store.scores().len(), 1);
    }

    #[tokio::test]
    async fn slow_oracle_fails_closed() {
        let (gate, _, store) = gate(
            ScriptedOracle::slow(Duration::from_millis(500)),
            Duration::from_millis(20),
        );
        let err = gate
            .admit(&domain::signal("alpha", "PEPE"), &domain::metrics("PEPE", dec!(1)))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "ScoringUnavailable");
        assert!(store.scores().is_empty());
    }

    #[tokio::test]
    async fn oracle_error_fails_closed() {
        let (gate, _, _) = gate(ScriptedOracle::failing(), Duration::from_secs(1));
        let err = gate
            .admit(&domain::signal("alpha", "PEPE"), &domain::metrics("PEPE", dec!(1)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ScoringUnavailable");
    }

    #[tokio::test]
    async fn out_of_range_score_is_unavailable() {
        let (gate, _, _) = gate(ScriptedOracle::fixed(1.5), Duration::from_secs(1));
        let err = gate
            .admit(&domain::signal("alpha", "PEPE"), &domain::metrics("PEPE", dec!(1)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ScoringUnavailable");
    }
}
