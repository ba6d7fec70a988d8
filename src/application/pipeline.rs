//! Signal pipeline: intake, confidence gate, then a buy request to the
//! rebalancing engine.
//!
//! Rejections at any stage are absorbed here, logged and reported to the
//! notifier. Nothing upstream of the engine touches the ledger.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::gate::ConfidenceGate;
use super::intake::SignalValidator;
use super::monitor::EngineClosed;
use super::rebalance::{AdmittedSignal, BuyOutcome, EngineInput};
use crate::domain::{SignalEvent, SignalRejection};
use crate::port::outbound::notifier::RejectionEvent;
use crate::port::{Event, Notifier};

/// Front half of the decision pipeline.
pub struct SignalPipeline {
    validator: SignalValidator,
    gate: ConfidenceGate,
    engine: mpsc::Sender<EngineInput>,
    notifier: Arc<dyn Notifier>,
}

impl SignalPipeline {
    #[must_use]
    pub fn new(
        validator: SignalValidator,
        gate: ConfidenceGate,
        engine: mpsc::Sender<EngineInput>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            validator,
            gate,
            engine,
            notifier,
        }
    }

    /// Take one signal through intake and the gate and, if admitted, wait
    /// for the engine's buy outcome.
    ///
    /// # Errors
    ///
    /// Returns [`EngineClosed`] if the engine is no longer running.
    pub async fn process(&self, event: &SignalEvent) -> Result<BuyOutcome, EngineClosed> {
        let outcome = self.admit_and_buy(event).await?;
        match &outcome {
            Ok(position) => info!(
                agent = %event.agent,
                source = %event.source_reference_id,
                position = %position.id(),
                ticker = %position.ticker(),
                "Signal opened position"
            ),
            Err(rejection) => {
                self.notifier
                    .notify(Event::SignalRejected(RejectionEvent::new(event, rejection)));
            }
        }
        Ok(outcome)
    }

    async fn admit_and_buy(&self, event: &SignalEvent) -> Result<BuyOutcome, EngineClosed> {
        let validated = match self.validator.validate(event).await {
            Ok(validated) => validated,
            Err(rejection) => return Ok(Err(rejection)),
        };
        let score = match self.gate.admit(&validated.signal, &validated.metrics).await {
            Ok(score) => score,
            Err(rejection) => return Ok(Err(rejection)),
        };

        let (reply, response) = oneshot::channel();
        let admitted = AdmittedSignal {
            signal: validated.signal,
            score,
            metrics: validated.metrics,
            admitted_at: Utc::now(),
        };
        self.engine
            .send(EngineInput::Buy {
                admitted: Box::new(admitted),
                reply: Some(reply),
            })
            .await
            .map_err(|_| EngineClosed)?;
        response.await.map_err(|_| EngineClosed)
    }

    /// Process signals until the source closes or the engine stops.
    pub async fn run(&self, mut signals: mpsc::Receiver<SignalEvent>) {
        info!("Signal pipeline started");
        while let Some(event) = signals.recv().await {
            debug!(agent = %event.agent, source = %event.source_reference_id, "Signal received");
            match self.process(&event).await {
                Ok(outcome) => debug!(
                    agent = %event.agent,
                    outcome = outcome_code(&outcome),
                    "Signal processed"
                ),
                Err(EngineClosed) => {
                    warn!("Rebalancing engine closed, signal pipeline stopping");
                    return;
                }
            }
        }
        info!("Signal source closed");
    }
}

/// Outcome code for logs and tests.
#[must_use]
pub fn outcome_code(outcome: &BuyOutcome) -> &'static str {
    outcome.as_ref().map_or_else(SignalRejection::code, |_| "Opened")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::outbound::memory::MemoryStore;
    use crate::application::gate::GateConfig;
    use crate::application::intake::IntakeCriteria;
    use crate::application::ledger::{LedgerLimits, PositionLedger};
    use crate::application::monitor::PriceBoard;
    use crate::application::rebalance::{RebalanceConfig, RebalancingEngine};
    use crate::testkit::dex::ScriptedExecutor;
    use crate::testkit::domain;
    use crate::testkit::market::MockMarket;
    use crate::testkit::notifier::RecordingNotifier;
    use crate::testkit::oracle::ScriptedOracle;
    use rust_decimal_macros::dec;

    struct Fixture {
        pipeline: SignalPipeline,
        ledger: Arc<PositionLedger>,
        notifier: Arc<RecordingNotifier>,
        engine_task: tokio::task::JoinHandle<()>,
    }

    fn fixture(score: f64) -> Fixture {
        let ledger = Arc::new(PositionLedger::new(LedgerLimits::default()));
        let market: Arc<MockMarket> = Arc::new(MockMarket::new().with_token("PEPE", dec!(1)));
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let engine = Arc::new(RebalancingEngine::new(
            Arc::clone(&ledger),
            Arc::new(PriceBoard::new()),
            market.clone(),
            Arc::new(ScriptedExecutor::new()),
            store.clone(),
            notifier.clone(),
            RebalanceConfig::default(),
        ));
        let (tx, rx) = mpsc::channel(16);
        let engine_task = tokio::spawn(async move {
            let _ = engine.run(rx).await;
        });

        let validator = SignalValidator::new(Arc::clone(&ledger), market, IntakeCriteria::default());
        let gate = ConfidenceGate::new(
            Arc::new(ScriptedOracle::fixed(score)),
            store.clone(),
            store,
            GateConfig::default(),
        );
        Fixture {
            pipeline: SignalPipeline::new(validator, gate, tx, notifier.clone()),
            ledger,
            notifier,
            engine_task,
        }
    }

    #[tokio::test]
    async fn admitted_signal_opens_position() {
        let fx = fixture(0.9);
        let outcome = fx.pipeline.process(&domain::event("alpha", "PEPE")).await.unwrap();

        assert_eq!(outcome_code(&outcome), "Opened");
        assert!(fx.ledger.holds(&"alpha".into(), &domain::contract("PEPE")));
        assert!(fx.notifier.rejection_codes().is_empty());
    }

    #[tokio::test]
    async fn rejection_is_reported_to_notifier() {
        let fx = fixture(0.2);
        let outcome = fx.pipeline.process(&domain::event("alpha", "PEPE")).await.unwrap();

        assert_eq!(outcome_code(&outcome), "LowConfidence");
        assert_eq!(fx.notifier.rejection_codes(), vec!["LowConfidence"]);
        assert_eq!(fx.ledger.snapshot().positions.len(), 0);
    }

    #[tokio::test]
    async fn stopped_engine_is_reported() {
        let fx = fixture(0.9);
        fx.engine_task.abort();
        let _ = fx.engine_task.await;

        let result = fx.pipeline.process(&domain::event("alpha", "PEPE")).await;
        assert_eq!(result.unwrap_err(), EngineClosed);
    }
}
