//! Notifier port for operator notifications.
//!
//! This module defines the trait for sending notifications about position
//! lifecycle events, surfaced execution failures, and ledger halts.

use rust_decimal::Decimal;

use crate::domain::{ExitReason, Position, PositionStatus, SignalEvent, SignalRejection};

/// Events that can trigger notifications.
#[derive(Debug, Clone)]
pub enum Event {
    /// A buy confirmed and a position was opened.
    PositionOpened(PositionEvent),
    /// Take-profit sold the cost basis.
    PartialTaken(PositionEvent),
    /// Position recovered its capital and is held indefinitely.
    Graduated(PositionEvent),
    /// Position fully sold.
    PositionClosed {
        position: PositionEvent,
        reason: ExitReason,
    },
    /// Candidate buy dropped.
    SignalRejected(RejectionEvent),
    /// Execution failed after all retries.
    ExecutionFailed(ExecutionFailureEvent),
    /// Ledger refused further mutation after an invariant violation.
    LedgerHalted {
        /// Description of the violated invariant.
        reason: String,
    },
}

/// Position lifecycle details.
#[derive(Debug, Clone)]
pub struct PositionEvent {
    pub position_id: String,
    pub agent: String,
    pub ticker: String,
    pub contract: String,
    pub status: PositionStatus,
    /// Price the triggering swap filled at.
    pub price: Decimal,
    /// USD moved by the triggering swap.
    pub amount_usd: Decimal,
    pub realized_pnl: Decimal,
    pub tx_hash: Option<String>,
}

impl PositionEvent {
    /// Describe `position` after a swap at `price` that moved `amount_usd`.
    #[must_use]
    pub fn new(position: &Position, price: Decimal, amount_usd: Decimal, tx_hash: Option<String>) -> Self {
        Self {
            position_id: position.id().to_string(),
            agent: position.agent().to_string(),
            ticker: position.ticker().to_string(),
            contract: position.contract().to_string(),
            status: position.status(),
            price,
            amount_usd,
            realized_pnl: position.realized_pnl(),
            tx_hash,
        }
    }
}

/// Rejected signal details.
#[derive(Debug, Clone)]
pub struct RejectionEvent {
    pub agent: String,
    pub source_reference_id: String,
    pub tickers: Vec<String>,
    pub code: &'static str,
    pub detail: String,
}

impl RejectionEvent {
    #[must_use]
    pub fn new(event: &SignalEvent, rejection: &SignalRejection) -> Self {
        Self {
            agent: event.agent.to_string(),
            source_reference_id: event.source_reference_id.clone(),
            tickers: event.mentioned_tickers.clone(),
            code: rejection.code(),
            detail: rejection.to_string(),
        }
    }
}

/// Surfaced execution failure details.
#[derive(Debug, Clone)]
pub struct ExecutionFailureEvent {
    /// Position id, or the ticker for buys.
    pub subject: String,
    pub decision: String,
    pub error: String,
}

/// Trait for notification handlers.
///
/// Notifications are fire-and-forget; `notify` must return quickly.
pub trait Notifier: Send + Sync {
    /// Handle an event.
    fn notify(&self, event: Event);
}

/// Registry of notifiers (composite pattern).
///
/// Broadcasts events to all registered notifiers.
pub struct NotifierRegistry {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotifierRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { notifiers: vec![] }
    }

    /// Register a notifier.
    pub fn register(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    /// Notify all registered notifiers.
    pub fn notify_all(&self, event: Event) {
        for notifier in &self.notifiers {
            notifier.notify(event.clone());
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

impl Default for NotifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for NotifierRegistry {
    fn notify(&self, event: Event) {
        self.notify_all(event);
    }
}

/// A logging notifier that logs events via tracing.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: Event) {
        use tracing::{error, info, warn};
        match event {
            Event::PositionOpened(e) => {
                info!(
                    position = %e.position_id,
                    agent = %e.agent,
                    ticker = %e.ticker,
                    price = %e.price,
                    size_usd = %e.amount_usd,
                    "Position opened"
                );
            }
            Event::PartialTaken(e) => {
                info!(
                    position = %e.position_id,
                    ticker = %e.ticker,
                    price = %e.price,
                    sold_usd = %e.amount_usd,
                    "Take-profit executed"
                );
            }
            Event::Graduated(e) => {
                info!(position = %e.position_id, ticker = %e.ticker, "Position graduated");
            }
            Event::PositionClosed { position, reason } => {
                info!(
                    position = %position.position_id,
                    ticker = %position.ticker,
                    reason = %reason,
                    pnl = %position.realized_pnl,
                    "Position closed"
                );
            }
            Event::SignalRejected(e) => {
                info!(
                    agent = %e.agent,
                    source = %e.source_reference_id,
                    code = e.code,
                    "Signal rejected"
                );
            }
            Event::ExecutionFailed(e) => {
                warn!(
                    subject = %e.subject,
                    decision = %e.decision,
                    error = %e.error,
                    "Execution failed"
                );
            }
            Event::LedgerHalted { reason } => {
                error!(reason = %reason, "Ledger halted");
            }
        }
    }
}
