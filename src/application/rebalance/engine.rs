//! Rebalancing engine: the decision core.
//!
//! A single consumer drains one input channel fed by the price monitor and
//! the confidence gate, so events for a position are handled in arrival
//! order and every read that informs a decision is followed by its write
//! before the next input is taken. The engine is the only component that
//! asks the execution router for trades and the ledger for lifecycle
//! transitions.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::journal::DecisionJournal;
use super::performance::worst_performer;
use super::rules::{self, Action, RuleConfig};
use crate::application::ledger::{BuyFill, PositionLedger};
use crate::application::monitor::PriceBoard;
use crate::application::stats::pnl_snapshot;
use crate::domain::{
    AgentId, CapacityScope, ConfidenceScore, DecisionKey, DecisionKind, ExitReason, PnlSnapshot,
    Position, Price, PriceChangeEvent, Quantity, RejectReason, SignalRejection, TradeAction,
    TradeDirection, TradeRecord, TradeSignal, UsdAmount,
};
use crate::error::LedgerError;
use crate::port::outbound::notifier::{ExecutionFailureEvent, PositionEvent};
use crate::port::{
    Event, ExecutionIntent, ExecutionReport, MarketData, Notifier, TokenMetrics, TradeExecutor,
    TradeStore,
};

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct RebalanceConfig {
    pub rules: RuleConfig,
    /// Lookback for scheduled worst-performer eviction.
    pub scheduled_window: Duration,
    /// Lookback for overflow eviction when a buy arrives at cap.
    pub overflow_window: Duration,
    /// Quote amount spent per buy.
    pub position_size_usd: UsdAmount,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            rules: RuleConfig::default(),
            scheduled_window: Duration::days(14),
            overflow_window: Duration::days(7),
            position_size_usd: Decimal::from(100),
        }
    }
}

/// A signal that passed intake and the confidence gate.
#[derive(Debug, Clone)]
pub struct AdmittedSignal {
    pub signal: TradeSignal,
    pub score: ConfidenceScore,
    pub metrics: TokenMetrics,
    pub admitted_at: DateTime<Utc>,
}

/// Result of a buy request.
pub type BuyOutcome = Result<Position, SignalRejection>;

/// Inputs accepted by the engine loop.
#[derive(Debug)]
pub enum EngineInput {
    PriceChange(PriceChangeEvent),
    /// The monitor finished a refresh pass.
    RefreshCompleted { observed_at: DateTime<Utc> },
    Buy {
        admitted: Box<AdmittedSignal>,
        reply: Option<oneshot::Sender<BuyOutcome>>,
    },
}

/// What happened to one evaluated decision.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionOutcome {
    Held,
    Applied {
        kind: DecisionKind,
        position: Position,
    },
    /// The key was already applied or is executing.
    AlreadyDecided(DecisionKind),
    /// A newer price arrived before execution began.
    Superseded(DecisionKind),
    /// The position left the state that justified the decision.
    Cancelled(DecisionKind),
    /// Execution failed; the ledger is unchanged and the decision retries.
    Failed { kind: DecisionKind, error: String },
    /// Execution confirmed but the ledger refused the transition.
    LedgerRejected { kind: DecisionKind, error: String },
    /// The ledger refuses all mutation.
    Halted,
    UnknownPosition,
}

impl DecisionOutcome {
    fn settles(&self) -> bool {
        matches!(self, Self::Applied { .. } | Self::LedgerRejected { .. })
    }
}

/// Decision core of the system.
pub struct RebalancingEngine {
    ledger: Arc<PositionLedger>,
    board: Arc<PriceBoard>,
    market: Arc<dyn MarketData>,
    executor: Arc<dyn TradeExecutor>,
    store: Arc<dyn TradeStore>,
    notifier: Arc<dyn Notifier>,
    config: RebalanceConfig,
    journal: DecisionJournal,
    scheduled: Mutex<HashSet<(AgentId, DateTime<Utc>)>>,
}

impl RebalancingEngine {
    #[must_use]
    pub fn new(
        ledger: Arc<PositionLedger>,
        board: Arc<PriceBoard>,
        market: Arc<dyn MarketData>,
        executor: Arc<dyn TradeExecutor>,
        store: Arc<dyn TradeStore>,
        notifier: Arc<dyn Notifier>,
        config: RebalanceConfig,
    ) -> Self {
        Self {
            ledger,
            board,
            market,
            executor,
            store,
            notifier,
            config,
            journal: DecisionJournal::new(),
            scheduled: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RebalanceConfig {
        &self.config
    }

    /// Drain `inputs` until the channel closes or the ledger halts.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Halted`] when the ledger halted; the process
    /// should stop and wait for an operator.
    pub async fn run(&self, mut inputs: mpsc::Receiver<EngineInput>) -> Result<(), LedgerError> {
        info!("Rebalancing engine started");
        while let Some(input) = inputs.recv().await {
            self.handle(input).await;
            if let Some(reason) = self.ledger.halted() {
                error!(reason = %reason, "Rebalancing engine stopping on halted ledger");
                return Err(LedgerError::Halted);
            }
        }
        info!("Rebalancing engine input closed");
        Ok(())
    }

    /// Handle one input.
    pub async fn handle(&self, input: EngineInput) {
        match input {
            EngineInput::PriceChange(event) => {
                let outcome = self.on_price_change(&event).await;
                debug!(position = %event.position_id, outcome = ?outcome, "Price change evaluated");
            }
            EngineInput::RefreshCompleted { observed_at } => {
                self.on_refresh_completed(observed_at).await;
            }
            EngineInput::Buy { admitted, reply } => {
                let outcome = self.buy(*admitted).await;
                if let Some(reply) = reply {
                    let _ = reply.send(outcome);
                }
            }
        }
    }

    /// Evaluate the price rules for one position.
    pub async fn on_price_change(&self, event: &PriceChangeEvent) -> DecisionOutcome {
        let Some(position) = self.ledger.position(event.position_id) else {
            warn!(position = %event.position_id, "Price change for unknown position");
            return DecisionOutcome::UnknownPosition;
        };
        if !position.status().is_active() {
            return DecisionOutcome::Held;
        }
        if let Err(e) = self.ledger.touch(position.id(), event.observed_at) {
            self.on_ledger_error(&e);
            return DecisionOutcome::Halted;
        }

        let action = rules::evaluate(
            &position,
            event.price_change_pct,
            event.current_price,
            &self.config.rules,
        );
        let Some(kind) = action.kind() else {
            return DecisionOutcome::Held;
        };

        let key = DecisionKey::new(position.id(), kind, position.entry_timestamp());
        if !self.journal.begin(key) {
            debug!(key = %key, "Decision already taken or in flight");
            return DecisionOutcome::AlreadyDecided(kind);
        }

        if let Some(outcome) = self.revalidate(&action, kind, event) {
            self.journal.abandon(key);
            return outcome;
        }

        info!(
            position = %position.id(),
            ticker = %position.ticker(),
            change = %event.price_change_pct,
            decision = %kind,
            "Rule triggered"
        );

        let outcome = match action {
            Action::Hold => DecisionOutcome::Held,
            Action::Graduate => self.execute_graduation(&position),
            Action::TakeProfit { quantity, price } => {
                self.execute_take_profit(&position, quantity, price).await
            }
            Action::StopLoss { quantity, price } => {
                self.execute_exit(&position, quantity, price, kind, ExitReason::StopLoss)
                    .await
            }
        };
        self.finish(key, outcome)
    }

    /// Scheduled evictions, a PnL snapshot, then bookkeeping cleanup.
    pub async fn on_refresh_completed(&self, observed_at: DateTime<Utc>) -> Vec<DecisionOutcome> {
        let outcomes = self.run_scheduled_evictions(observed_at).await;
        self.write_pnl_snapshot(observed_at);
        self.prune(observed_at);
        outcomes
    }

    /// Forget decisions for closed positions and eviction triggers that can
    /// no longer come due.
    ///
    /// A closed position is never evaluated again, and the most recent
    /// anniversary is always newer than `now - scheduled_window`.
    pub fn prune(&self, now: DateTime<Utc>) {
        let ledger = &self.ledger;
        let decisions = self.journal.retain_completed(|key| {
            ledger
                .position(key.position)
                .is_some_and(|p| p.status().is_active())
        });
        let horizon = now - self.config.scheduled_window;
        let mut scheduled = self.scheduled.lock();
        let before = scheduled.len();
        scheduled.retain(|(_, trigger)| *trigger > horizon);
        let triggers = before - scheduled.len();
        if decisions + triggers > 0 {
            debug!(decisions, triggers, "Pruned decision bookkeeping");
        }
    }

    /// Completed decisions and scheduled triggers still remembered.
    #[must_use]
    pub fn bookkeeping_len(&self) -> (usize, usize) {
        (self.journal.completed(), self.scheduled.lock().len())
    }

    /// Evict the worst 14-day performer of every agent whose cap is full and
    /// whose eviction anniversary has arrived.
    pub async fn run_scheduled_evictions(&self, now: DateTime<Utc>) -> Vec<DecisionOutcome> {
        let snapshot = self.ledger.snapshot();
        let window = self.config.scheduled_window;
        let agents: BTreeSet<AgentId> = snapshot.open_counts.keys().cloned().collect();
        let mut outcomes = Vec::new();

        for agent in agents {
            let cap = snapshot.agent_cap(&agent);
            if cap == 0 || snapshot.open_count(&agent) < cap {
                continue;
            }
            let Some(latest_entry) = snapshot
                .capped_positions(&agent)
                .map(Position::entry_timestamp)
                .max()
            else {
                continue;
            };
            let Some(trigger) = latest_anniversary(latest_entry, now, window) else {
                continue;
            };
            if self.scheduled.lock().contains(&(agent.clone(), trigger)) {
                continue;
            }
            let Some(worst) = worst_performer(snapshot.capped_positions(&agent), &self.board, now, window)
            else {
                continue;
            };

            info!(
                agent = %agent,
                position = %worst.position.id(),
                trailing_return = %worst.trailing_return,
                trigger = %trigger,
                "Scheduled eviction due"
            );
            let key = DecisionKey::new(worst.position.id(), DecisionKind::ScheduledEviction, trigger);
            let outcome = self
                .evict(worst.position, key, ExitReason::ScheduledEviction)
                .await;
            if outcome.settles() {
                self.scheduled.lock().insert((agent, trigger));
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Open a position for an admitted signal, evicting on overflow.
    pub async fn buy(&self, admitted: AdmittedSignal) -> BuyOutcome {
        let signal = &admitted.signal;
        let size = self.config.position_size_usd;

        let reservation = match self.ledger.reserve(&signal.agent, &signal.contract, size) {
            Ok(reservation) => reservation,
            Err(LedgerError::CapacityExceeded {
                scope: scope @ (CapacityScope::Agent | CapacityScope::Global),
            }) => {
                info!(
                    agent = %signal.agent,
                    ticker = %signal.ticker,
                    scope = %scope,
                    "At capacity, evicting worst 7-day performer"
                );
                self.overflow_evict(signal, scope, admitted.admitted_at)
                    .await
                    .map_err(|detail| self.reject(signal, SignalRejection::CapacityUnavailable { detail }))?;
                self.ledger
                    .reserve(&signal.agent, &signal.contract, size)
                    .map_err(|e| {
                        self.reject(
                            signal,
                            SignalRejection::CapacityUnavailable {
                                detail: e.to_string(),
                            },
                        )
                    })?
            }
            Err(LedgerError::CapacityExceeded { scope }) => {
                return Err(self.reject(signal, SignalRejection::CapacityExceeded { scope }));
            }
            Err(LedgerError::DuplicatePosition { .. }) => {
                return Err(self.reject(signal, SignalRejection::signal(RejectReason::AlreadyHeld)));
            }
            Err(e) => {
                self.on_ledger_error(&e);
                return Err(self.reject(
                    signal,
                    SignalRejection::CapacityUnavailable {
                        detail: e.to_string(),
                    },
                ));
            }
        };

        let intent = ExecutionIntent {
            position_id: None,
            ticker: signal.ticker.clone(),
            contract: signal.contract.clone(),
            network: signal.network.clone(),
            direction: TradeDirection::Buy,
            amount: size,
            reference_price: admitted.metrics.price_usd,
            slippage: None,
        };
        let report = match self.executor.execute(&intent).await {
            Ok(report) => report,
            Err(e) => {
                self.ledger.release(reservation);
                self.notify_execution_failure(signal.ticker.clone(), "buy", &e.to_string());
                return Err(self.reject(
                    signal,
                    SignalRejection::ExecutionFailed {
                        detail: e.to_string(),
                    },
                ));
            }
        };

        let now = Utc::now();
        let fill = BuyFill {
            price: report.fill_price,
            spent_usd: report.amount_in,
            quantity: report.amount_out,
        };
        match self
            .ledger
            .commit(reservation, signal, fill, Some(admitted.score.score()), now)
        {
            Ok(position) => {
                self.board.record(position.id(), report.fill_price, now);
                self.record_trade(&position, TradeAction::Open, None, Some(report.tx_hash.clone()), now);
                self.notifier.notify(Event::PositionOpened(PositionEvent::new(
                    &position,
                    report.fill_price,
                    report.amount_in,
                    Some(report.tx_hash),
                )));
                Ok(position)
            }
            Err(e) => {
                error!(
                    agent = %signal.agent,
                    ticker = %signal.ticker,
                    tx = %report.tx_hash,
                    quantity = %report.amount_out,
                    error = %e,
                    "Buy confirmed but not recorded, holding is untracked"
                );
                self.on_ledger_error(&e);
                Err(self.reject(
                    signal,
                    SignalRejection::CapacityUnavailable {
                        detail: e.to_string(),
                    },
                ))
            }
        }
    }

    /// Mark-to-market snapshot persisted after each refresh pass.
    pub fn write_pnl_snapshot(&self, at: DateTime<Utc>) -> PnlSnapshot {
        let snapshot = pnl_snapshot(&self.ledger.snapshot(), &self.board, at);
        if let Err(e) = self.store.append_pnl_snapshot(&snapshot) {
            warn!(error = %e, "Failed to persist PnL snapshot");
        }
        info!(
            positions = snapshot.rows.len(),
            invested = %snapshot.grand_total.invested_usd,
            value = %snapshot.grand_total.current_value_usd,
            pnl = %snapshot.grand_total.pnl_usd,
            "PnL snapshot"
        );
        snapshot
    }

    async fn overflow_evict(
        &self,
        signal: &TradeSignal,
        scope: CapacityScope,
        at: DateTime<Utc>,
    ) -> Result<(), String> {
        let snapshot = self.ledger.snapshot();
        let candidates: Vec<&Position> = match scope {
            CapacityScope::Agent => snapshot.capped_positions(&signal.agent).collect(),
            _ => snapshot
                .positions
                .iter()
                .filter(|p| p.status().counts_toward_cap())
                .collect(),
        };
        let Some(worst) = worst_performer(candidates, &self.board, at, self.config.overflow_window)
        else {
            return Err("no eviction candidate".into());
        };

        info!(
            position = %worst.position.id(),
            ticker = %worst.position.ticker(),
            trailing_return = %worst.trailing_return,
            incoming = %signal.ticker,
            "Overflow eviction"
        );
        let key = DecisionKey::new(worst.position.id(), DecisionKind::OverflowEviction, at);
        match self
            .evict(worst.position, key, ExitReason::OverflowEviction)
            .await
        {
            DecisionOutcome::Applied { .. } => Ok(()),
            DecisionOutcome::Failed { error, .. } | DecisionOutcome::LedgerRejected { error, .. } => {
                Err(format!("eviction failed: {error}"))
            }
            other => Err(format!("eviction not applied: {other:?}")),
        }
    }

    async fn evict(&self, position: &Position, key: DecisionKey, reason: ExitReason) -> DecisionOutcome {
        if !self.journal.begin(key) {
            return DecisionOutcome::AlreadyDecided(key.kind);
        }
        let current = match self.ledger.position(position.id()) {
            Some(current) if current.status().counts_toward_cap() => current,
            _ => {
                self.journal.abandon(key);
                return DecisionOutcome::Cancelled(key.kind);
            }
        };
        let price = match self.current_price(&current).await {
            Ok(price) => price,
            Err(error) => {
                self.journal.abandon(key);
                return DecisionOutcome::Failed {
                    kind: key.kind,
                    error,
                };
            }
        };
        let outcome = self
            .execute_exit(&current, current.quantity(), price, key.kind, reason)
            .await;
        self.finish(key, outcome)
    }

    fn revalidate(
        &self,
        action: &Action,
        kind: DecisionKind,
        event: &PriceChangeEvent,
    ) -> Option<DecisionOutcome> {
        if kind != DecisionKind::Graduate && self.board.has_newer(event.position_id, event.observed_at) {
            debug!(position = %event.position_id, decision = %kind, "Decision superseded by newer price");
            return Some(DecisionOutcome::Superseded(kind));
        }
        let status = self.ledger.position(event.position_id).map(|p| p.status());
        if status != action.required_status() {
            debug!(
                position = %event.position_id,
                decision = %kind,
                status = ?status,
                "Decision cancelled, position moved on"
            );
            return Some(DecisionOutcome::Cancelled(kind));
        }
        None
    }

    fn finish(&self, key: DecisionKey, outcome: DecisionOutcome) -> DecisionOutcome {
        if outcome.settles() {
            self.journal.complete(key);
        } else {
            self.journal.abandon(key);
        }
        outcome
    }

    fn execute_graduation(&self, position: &Position) -> DecisionOutcome {
        match self.ledger.mark_graduated(position.id()) {
            Ok(updated) => {
                let now = Utc::now();
                self.record_trade(&updated, TradeAction::Graduate, None, None, now);
                self.notifier.notify(Event::Graduated(PositionEvent::new(
                    &updated,
                    position.entry_price(),
                    Decimal::ZERO,
                    None,
                )));
                DecisionOutcome::Applied {
                    kind: DecisionKind::Graduate,
                    position: updated,
                }
            }
            Err(e) => {
                self.on_ledger_error(&e);
                DecisionOutcome::Failed {
                    kind: DecisionKind::Graduate,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn execute_take_profit(
        &self,
        position: &Position,
        quantity: Quantity,
        price: Price,
    ) -> DecisionOutcome {
        let kind = DecisionKind::TakeProfit;
        let report = match self.sell(position, quantity, price, kind).await {
            Ok(report) => report,
            Err(outcome) => return outcome,
        };
        // Graduation compares the notional at the observed price.
        let sold_usd = quantity * price;
        match self
            .ledger
            .record_partial_sell(position.id(), sold_usd, price, report.amount_out)
        {
            Ok(updated) => {
                let now = Utc::now();
                self.record_trade(
                    &updated,
                    TradeAction::PartialSell,
                    Some(ExitReason::TakeProfit),
                    Some(report.tx_hash.clone()),
                    now,
                );
                self.notifier.notify(Event::PartialTaken(PositionEvent::new(
                    &updated,
                    price,
                    report.amount_out,
                    Some(report.tx_hash),
                )));
                DecisionOutcome::Applied {
                    kind,
                    position: updated,
                }
            }
            Err(e) => {
                self.on_ledger_error(&e);
                DecisionOutcome::LedgerRejected {
                    kind,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn execute_exit(
        &self,
        position: &Position,
        quantity: Quantity,
        price: Price,
        kind: DecisionKind,
        reason: ExitReason,
    ) -> DecisionOutcome {
        let report = match self.sell(position, quantity, price, kind).await {
            Ok(report) => report,
            Err(outcome) => return outcome,
        };
        let now = Utc::now();
        match self.ledger.close_position(position.id(), report.fill_price, now) {
            Ok(updated) => {
                self.board.forget(updated.id());
                self.record_trade(
                    &updated,
                    TradeAction::Close,
                    Some(reason),
                    Some(report.tx_hash.clone()),
                    now,
                );
                self.notifier.notify(Event::PositionClosed {
                    position: PositionEvent::new(
                        &updated,
                        report.fill_price,
                        report.amount_out,
                        Some(report.tx_hash),
                    ),
                    reason,
                });
                DecisionOutcome::Applied {
                    kind,
                    position: updated,
                }
            }
            Err(e) => {
                self.on_ledger_error(&e);
                DecisionOutcome::LedgerRejected {
                    kind,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn sell(
        &self,
        position: &Position,
        quantity: Quantity,
        price: Price,
        kind: DecisionKind,
    ) -> Result<ExecutionReport, DecisionOutcome> {
        let intent = ExecutionIntent {
            position_id: Some(position.id()),
            ticker: position.ticker().to_string(),
            contract: position.contract().clone(),
            network: position.network().clone(),
            direction: TradeDirection::Sell,
            amount: quantity,
            reference_price: price,
            slippage: None,
        };
        self.executor.execute(&intent).await.map_err(|e| {
            warn!(
                position = %position.id(),
                decision = %kind,
                error = %e,
                "Sell failed, decision left unapplied"
            );
            self.notify_execution_failure(position.id().to_string(), kind.as_str(), &e.to_string());
            DecisionOutcome::Failed {
                kind,
                error: e.to_string(),
            }
        })
    }

    async fn current_price(&self, position: &Position) -> Result<Price, String> {
        if let Some(observation) = self.board.latest(position.id()) {
            return Ok(observation.price);
        }
        self.market
            .price(position.contract(), position.network())
            .await
            .map_err(|e| format!("no price for {}: {e}", position.contract()))
    }

    fn record_trade(
        &self,
        position: &Position,
        action: TradeAction,
        reason: Option<ExitReason>,
        tx_hash: Option<String>,
        at: DateTime<Utc>,
    ) {
        let record = TradeRecord::from_position(
            position,
            action,
            self.config.rules.exit_levels(),
            reason,
            tx_hash,
            at,
        );
        if let Err(e) = self.store.append_trade(&record) {
            warn!(trade_id = %record.trade_id, error = %e, "Failed to persist trade record");
        }
    }

    fn reject(&self, signal: &TradeSignal, rejection: SignalRejection) -> SignalRejection {
        info!(
            agent = %signal.agent,
            ticker = %signal.ticker,
            contract = %signal.contract,
            code = rejection.code(),
            detail = %rejection,
            "Buy rejected"
        );
        rejection
    }

    fn notify_execution_failure(&self, subject: String, decision: &str, error: &str) {
        self.notifier.notify(Event::ExecutionFailed(ExecutionFailureEvent {
            subject,
            decision: decision.to_string(),
            error: error.to_string(),
        }));
    }

    fn on_ledger_error(&self, error: &LedgerError) {
        if error.is_fatal() {
            error!(error = %error, "Ledger refused mutation");
            self.notifier.notify(Event::LedgerHalted {
                reason: error.to_string(),
            });
        } else {
            warn!(error = %error, "Ledger rejected transition");
        }
    }
}

/// Most recent `latest + k * window` (k >= 1) that is not after `now`.
fn latest_anniversary(
    latest: DateTime<Utc>,
    now: DateTime<Utc>,
    window: Duration,
) -> Option<DateTime<Utc>> {
    let window_secs = window.num_seconds();
    if window_secs <= 0 || now < latest + window {
        return None;
    }
    let periods = (now - latest).num_seconds() / window_secs;
    Some(latest + Duration::seconds(window_secs * periods))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PositionStatus;

    #[test]
    fn anniversary_is_none_before_first_window() {
        let latest = Utc::now();
        assert!(latest_anniversary(latest, latest + Duration::days(13), Duration::days(14)).is_none());
    }

    #[test]
    fn anniversary_rolls_forward() {
        let latest = Utc::now();
        let window = Duration::days(14);
        assert_eq!(
            latest_anniversary(latest, latest + Duration::days(14), window),
            Some(latest + Duration::days(14))
        );
        assert_eq!(
            latest_anniversary(latest, latest + Duration::days(30), window),
            Some(latest + Duration::days(28))
        );
    }

    #[test]
    fn partial_status_requirements() {
        assert_eq!(
            Action::Graduate.required_status(),
            Some(PositionStatus::PartialTaken)
        );
    }
}
