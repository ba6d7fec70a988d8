//! Signal intake validator.
//!
//! Filters raw signal events before they reach the confidence gate. Checks
//! run in order and short-circuit: ticker ambiguity, contract resolution,
//! then already-held, age, liquidity, market cap and volume. When several
//! contracts share the ticker only the most liquid one is checked.
//! The validator never mutates the ledger.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::application::ledger::PositionLedger;
use crate::domain::signal::normalize_ticker;
use crate::domain::{ContractRef, RejectReason, SignalEvent, SignalRejection, TradeSignal, UsdAmount};
use crate::port::{MarketData, TokenMetrics};

/// Intake thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct IntakeCriteria {
    pub min_token_age: Duration,
    pub min_liquidity_usd: UsdAmount,
    pub min_market_cap_usd: Option<UsdAmount>,
    pub max_market_cap_usd: Option<UsdAmount>,
    pub min_volume_24h_usd: Option<UsdAmount>,
}

impl Default for IntakeCriteria {
    fn default() -> Self {
        Self {
            min_token_age: Duration::days(2),
            min_liquidity_usd: Decimal::from(250_000),
            min_market_cap_usd: None,
            max_market_cap_usd: None,
            min_volume_24h_usd: None,
        }
    }
}

/// A signal that passed intake, with the metrics used to judge it.
#[derive(Debug, Clone)]
pub struct ValidatedSignal {
    pub signal: TradeSignal,
    pub metrics: TokenMetrics,
}

/// Validates raw signals against the ledger and market data.
pub struct SignalValidator {
    ledger: Arc<PositionLedger>,
    market: Arc<dyn MarketData>,
    criteria: IntakeCriteria,
}

impl SignalValidator {
    #[must_use]
    pub fn new(
        ledger: Arc<PositionLedger>,
        market: Arc<dyn MarketData>,
        criteria: IntakeCriteria,
    ) -> Self {
        Self {
            ledger,
            market,
            criteria,
        }
    }

    /// Validate one event.
    ///
    /// # Errors
    ///
    /// Returns a [`SignalRejection::SignalRejected`] with the first failing
    /// reason.
    pub async fn validate(&self, event: &SignalEvent) -> Result<ValidatedSignal, SignalRejection> {
        let result = self.check(event).await;
        match &result {
            Ok(valid) => debug!(
                agent = %event.agent,
                ticker = %valid.signal.ticker,
                contract = %valid.signal.contract,
                liquidity = %valid.metrics.liquidity_usd,
                "Signal passed intake"
            ),
            Err(rejection) => info!(
                agent = %event.agent,
                source = %event.source_reference_id,
                tickers = ?event.mentioned_tickers,
                code = rejection.code(),
                "Signal rejected at intake"
            ),
        }
        result
    }

    async fn check(&self, event: &SignalEvent) -> Result<ValidatedSignal, SignalRejection> {
        let ticker_count = event.mentioned_ticker_count();
        if ticker_count > 1 {
            return Err(SignalRejection::signal(RejectReason::MultiTicker));
        }

        let candidates = self.candidates(event).await?;
        let (contract, metrics) = self.most_liquid(candidates).await?;

        self.check_contract(event, &contract, &metrics)
            .map_err(SignalRejection::signal)?;

        let mut signal = TradeSignal::new(event.agent.clone(), event.source_reference_id.clone(), contract);
        signal.mentioned_ticker_count = ticker_count;
        Ok(ValidatedSignal { signal, metrics })
    }

    /// Pick the deepest pool among same-ticker candidates. The others are
    /// dropped before any per-contract check runs.
    async fn most_liquid(
        &self,
        candidates: Vec<ContractRef>,
    ) -> Result<(ContractRef, TokenMetrics), SignalRejection> {
        let mut best: Option<(ContractRef, TokenMetrics)> = None;
        for candidate in candidates {
            let metrics = match self.market.metrics(&candidate.contract, &candidate.network).await {
                Ok(metrics) => metrics,
                Err(e) => {
                    debug!(contract = %candidate.contract, error = %e, "Candidate lookup failed");
                    continue;
                }
            };
            let deeper = best
                .as_ref()
                .map_or(true, |(_, current)| metrics.liquidity_usd > current.liquidity_usd);
            if deeper {
                best = Some((candidate, metrics));
            }
        }
        best.ok_or_else(|| SignalRejection::signal(RejectReason::MarketDataUnavailable))
    }

    async fn candidates(&self, event: &SignalEvent) -> Result<Vec<ContractRef>, SignalRejection> {
        if !event.contracts.is_empty() {
            return Ok(event.contracts.clone());
        }
        let Some(ticker) = event.mentioned_tickers.first().map(|t| normalize_ticker(t)) else {
            return Err(SignalRejection::signal(RejectReason::NoContract));
        };
        let resolved = self
            .market
            .resolve_ticker(&ticker)
            .await
            .map_err(|_| SignalRejection::signal(RejectReason::MarketDataUnavailable))?;
        if resolved.is_empty() {
            return Err(SignalRejection::signal(RejectReason::NoContract));
        }
        Ok(resolved)
    }

    fn check_contract(
        &self,
        event: &SignalEvent,
        candidate: &ContractRef,
        metrics: &TokenMetrics,
    ) -> Result<(), RejectReason> {
        if self.ledger.holds(&event.agent, &candidate.contract) {
            return Err(RejectReason::AlreadyHeld);
        }
        match metrics.age_at(Utc::now()) {
            Some(age) if age >= self.criteria.min_token_age => {}
            _ => return Err(RejectReason::TooYoung),
        }
        if metrics.liquidity_usd < self.criteria.min_liquidity_usd {
            return Err(RejectReason::LowLiquidity);
        }
        if let Some(min) = self.criteria.min_market_cap_usd {
            if metrics.market_cap_usd.map_or(true, |cap| cap < min) {
                return Err(RejectReason::MarketCapOutOfRange);
            }
        }
        if let Some(max) = self.criteria.max_market_cap_usd {
            if metrics.market_cap_usd.map_or(true, |cap| cap > max) {
                return Err(RejectReason::MarketCapOutOfRange);
            }
        }
        if let Some(min) = self.criteria.min_volume_24h_usd {
            if metrics.volume_24h_usd < min {
                return Err(RejectReason::LowVolume);
            }
        }
        Ok(())
    }
}
