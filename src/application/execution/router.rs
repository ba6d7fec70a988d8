//! Execution router.
//!
//! Turns an approved intent into one confirmed swap: quote, minimum-output
//! bound, calldata, gas, nonce, broadcast and confirmation. A failed attempt
//! is retried once with a higher gas price before the failure is surfaced;
//! the ledger is only updated by the caller after a confirmed report.
//!
//! Confirmed reports carry the wallet's balance change of the output token,
//! not the quote, so transfer fees and fills below quote are accounted for.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::calldata::{encode_approve, encode_swap, SwapParams};
use super::gas::GasPolicy;
use super::nonce::{NonceManager, NonceSlot};
use super::slippage::{effective_slippage, min_output};
use super::units::{from_units, to_units};
use crate::domain::{Network, TradeDirection};
use crate::error::{Error, ExecutionError, ExecutionFailureReason};
use crate::port::{DexRouter, ExecutionIntent, ExecutionReport, SwapTransaction, TradeExecutor, TxStatus};

/// Revert string UniswapV2 routers use when the output bound is missed.
const INSUFFICIENT_OUTPUT: &str = "INSUFFICIENT_OUTPUT_AMOUNT";

/// Router-wide execution settings.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub default_slippage: Decimal,
    pub slippage_floor: Decimal,
    pub gas: GasPolicy,
    /// Router deadline measured from submission.
    pub deadline: Duration,
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
    /// Attempts per decision, including the first.
    pub max_attempts: u32,
    /// Suffix appended to swap calldata.
    pub builder_code: Bytes,
    /// Quote and build only; never broadcast.
    pub dry_run: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_slippage: Decimal::new(5, 2),
            slippage_floor: Decimal::new(2, 2),
            gas: GasPolicy::default(),
            deadline: Duration::from_secs(1200),
            confirmation_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_millis(2000),
            max_attempts: 2,
            builder_code: Bytes::new(),
            dry_run: false,
        }
    }
}

/// How trades on one network are routed.
#[derive(Clone)]
pub struct Route {
    pub dex: Arc<dyn DexRouter>,
    /// UniswapV2-style router contract.
    pub router: Address,
    /// USD-pegged token every trade is priced against.
    pub quote_token: Address,
    pub fee_on_transfer: HashSet<Address>,
}

/// A swap ready to broadcast.
struct PreparedSwap {
    path: Vec<Address>,
    amount_in: U256,
    amount_in_dec: Decimal,
    amount_out_dec: Decimal,
    decimals_out: u8,
    fill_price: Decimal,
    min_out: U256,
    calldata: Bytes,
}

/// Why one attempt did not confirm.
struct AttemptFailure {
    reason: ExecutionFailureReason,
    detail: String,
    /// The nonce was used by a mined transaction.
    nonce_consumed: bool,
}

/// [`TradeExecutor`] over per-network DEX routes.
pub struct ExecutionRouter {
    routes: HashMap<Network, Route>,
    nonces: NonceManager,
    config: ExecutionConfig,
}

impl ExecutionRouter {
    #[must_use]
    pub fn new(config: ExecutionConfig) -> Self {
        Self {
            routes: HashMap::new(),
            nonces: NonceManager::new(),
            config,
        }
    }

    /// Register the route for `network`.
    #[must_use]
    pub fn with_route(mut self, network: Network, route: Route) -> Self {
        self.routes.insert(network, route);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    async fn prepare(
        &self,
        route: &Route,
        token: Address,
        intent: &ExecutionIntent,
    ) -> Result<PreparedSwap, ExecutionError> {
        let path = match intent.direction {
            TradeDirection::Buy => vec![route.quote_token, token],
            TradeDirection::Sell => vec![token, route.quote_token],
        };

        let decimals_in = route.dex.decimals(path[0]).await.map_err(quote_failed)?;
        let decimals_out = route.dex.decimals(path[1]).await.map_err(quote_failed)?;

        let amount_in = to_units(intent.amount, decimals_in).ok_or_else(|| {
            ExecutionError::InvalidToken {
                token: intent.contract.to_string(),
                reason: format!("cannot express {} in base units", intent.amount),
            }
        })?;
        if amount_in.is_zero() {
            return Err(ExecutionError::QuoteFailed("amount rounds to zero".into()));
        }

        let quoted = route
            .dex
            .quote(route.router, &path, amount_in)
            .await
            .map_err(quote_failed)?;
        if quoted.is_zero() {
            return Err(ExecutionError::QuoteFailed("router quoted zero output".into()));
        }

        let amount_in_dec = from_units(amount_in, decimals_in).unwrap_or(intent.amount);
        let amount_out_dec = from_units(quoted, decimals_out)
            .ok_or_else(|| ExecutionError::QuoteFailed("quote exceeds decimal range".into()))?;
        let fill_price = fill_price(intent.direction, amount_in_dec, amount_out_dec)
            .ok_or_else(|| ExecutionError::QuoteFailed("quote below decimal precision".into()))?;

        let slippage = effective_slippage(
            intent.slippage,
            self.config.default_slippage,
            self.config.slippage_floor,
        );
        let min_out = min_output(quoted, slippage);
        let deadline = Utc::now().timestamp().max(0).unsigned_abs() + self.config.deadline.as_secs();
        let fee_on_transfer = path.iter().any(|t| route.fee_on_transfer.contains(t));

        let calldata = encode_swap(
            &SwapParams {
                amount_in,
                min_out,
                path: path.clone(),
                recipient: route.dex.wallet(),
                deadline,
                fee_on_transfer,
            },
            &self.config.builder_code,
        );

        debug!(
            ticker = %intent.ticker,
            direction = ?intent.direction,
            amount_in = %amount_in_dec,
            quoted_out = %amount_out_dec,
            slippage = %slippage,
            fee_on_transfer,
            "Swap prepared"
        );

        Ok(PreparedSwap {
            path,
            amount_in,
            amount_in_dec,
            amount_out_dec,
            decimals_out,
            fill_price,
            min_out,
            calldata,
        })
    }

    /// Approve the router for the input token when the allowance is short.
    async fn ensure_allowance(
        &self,
        route: &Route,
        slot: &mut NonceSlot,
        token: Address,
        needed: U256,
        gas_price: u128,
    ) -> Result<(), ExecutionError> {
        let wallet = route.dex.wallet();
        let allowance = route
            .dex
            .allowance(token, wallet, route.router)
            .await
            .map_err(quote_failed)?;
        if allowance >= needed {
            return Ok(());
        }

        let nonce = slot.current(route.dex.as_ref()).await.map_err(submission_failed)?;
        let mut tx = SwapTransaction {
            to: token,
            input: encode_approve(route.router),
            nonce,
            gas_limit: 0,
            gas_price,
            chain_id: route.dex.chain_id(),
        };
        tx.gas_limit = self
            .config
            .gas
            .limit(route.dex.estimate_gas(&tx).await.map_err(submission_failed)?);

        info!(token = %token, spender = %route.router, nonce, "Submitting router approval");
        let hash = route.dex.submit(&tx).await.map_err(submission_failed)?;
        match self.await_confirmation(route.dex.as_ref(), hash).await {
            Ok(()) => {
                slot.consumed(nonce);
                Ok(())
            }
            Err(failure) => {
                if failure.nonce_consumed {
                    slot.consumed(nonce);
                } else {
                    slot.reset();
                }
                Err(ExecutionError::Failed {
                    reason: failure.reason,
                    attempts: 1,
                    detail: format!("approval: {}", failure.detail),
                })
            }
        }
    }

    async fn await_confirmation(&self, dex: &dyn DexRouter, hash: B256) -> Result<(), AttemptFailure> {
        let poll = async {
            loop {
                match dex.poll(hash).await {
                    Ok(TxStatus::Confirmed) => return Ok(()),
                    Ok(TxStatus::Failed { reason }) => {
                        return Err(AttemptFailure {
                            reason: classify(&reason, ExecutionFailureReason::Reverted),
                            detail: reason,
                            nonce_consumed: true,
                        })
                    }
                    Ok(TxStatus::Pending) => {}
                    Err(e) => debug!(tx = %hash, error = %e, "Receipt poll failed"),
                }
                tokio::time::sleep(self.config.poll_interval).await;
            }
        };

        match tokio::time::timeout(self.config.confirmation_timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(AttemptFailure {
                reason: ExecutionFailureReason::Timeout,
                detail: format!("no confirmation for {hash} within {:?}", self.config.confirmation_timeout),
                nonce_consumed: false,
            }),
        }
    }

    /// Output tokens the confirmed swap delivered to the wallet.
    ///
    /// Falls back to the minimum-output bound, which the router enforced on
    /// chain, when the balance change cannot be read.
    async fn received(
        &self,
        route: &Route,
        token: Address,
        before: Option<U256>,
        prepared: &PreparedSwap,
    ) -> U256 {
        let delta = match before {
            Some(before) => match route.dex.balance_of(token, route.dex.wallet()).await {
                Ok(after) => Some(after.saturating_sub(before)),
                Err(e) => {
                    warn!(token = %token, error = %e, "Post-swap balance read failed");
                    None
                }
            },
            None => None,
        };
        match delta {
            Some(delta) if !delta.is_zero() => delta,
            _ => {
                warn!(token = %token, min_out = %prepared.min_out, "Using minimum output as received amount");
                prepared.min_out
            }
        }
    }

    /// Broadcast the swap, retrying with a gas bump until confirmed or out
    /// of attempts. Returns the confirmed hash and the attempts used.
    async fn broadcast(
        &self,
        route: &Route,
        slot: &mut NonceSlot,
        prepared: &PreparedSwap,
        mut gas_price: u128,
        intent: &ExecutionIntent,
    ) -> Result<(B256, u32), ExecutionError> {
        let mut last: Option<AttemptFailure> = None;
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let nonce = slot.current(route.dex.as_ref()).await.map_err(submission_failed)?;
            let mut tx = SwapTransaction {
                to: route.router,
                input: prepared.calldata.clone(),
                nonce,
                gas_limit: 0,
                gas_price,
                chain_id: route.dex.chain_id(),
            };

            let outcome = match route.dex.estimate_gas(&tx).await {
                Err(e) => Err(AttemptFailure {
                    reason: classify(&e.to_string(), ExecutionFailureReason::Reverted),
                    detail: format!("gas estimation: {e}"),
                    nonce_consumed: false,
                }),
                Ok(estimate) => {
                    tx.gas_limit = self.config.gas.limit(estimate);
                    info!(
                        ticker = %intent.ticker,
                        direction = ?intent.direction,
                        attempt,
                        nonce,
                        gas_price,
                        gas_limit = tx.gas_limit,
                        "Submitting swap"
                    );
                    match route.dex.submit(&tx).await {
                        Err(e) => {
                            // Rejected before broadcast; the cached nonce may be stale.
                            slot.reset();
                            Err(AttemptFailure {
                                reason: classify(&e.to_string(), ExecutionFailureReason::Reverted),
                                detail: format!("submit: {e}"),
                                nonce_consumed: false,
                            })
                        }
                        Ok(hash) => self
                            .await_confirmation(route.dex.as_ref(), hash)
                            .await
                            .map(|()| hash),
                    }
                }
            };

            match outcome {
                Ok(hash) => {
                    slot.consumed(nonce);
                    return Ok((hash, attempt));
                }
                Err(failure) => {
                    warn!(
                        ticker = %intent.ticker,
                        attempt,
                        nonce,
                        reason = %failure.reason,
                        detail = %failure.detail,
                        "Swap attempt failed"
                    );
                    if failure.nonce_consumed {
                        slot.consumed(nonce);
                    }
                    gas_price = self.config.gas.bump(gas_price);
                    last = Some(failure);
                }
            }
        }

        let failure = last.unwrap_or(AttemptFailure {
            reason: ExecutionFailureReason::Reverted,
            detail: "no attempt made".into(),
            nonce_consumed: false,
        });
        Err(ExecutionError::Failed {
            reason: failure.reason,
            attempts: max_attempts,
            detail: failure.detail,
        })
    }
}

#[async_trait]
impl TradeExecutor for ExecutionRouter {
    async fn execute(&self, intent: &ExecutionIntent) -> Result<ExecutionReport, ExecutionError> {
        let route = self
            .routes
            .get(&intent.network)
            .ok_or_else(|| ExecutionError::UnsupportedNetwork(intent.network.to_string()))?;
        let token = Address::from_str(intent.contract.as_str()).map_err(|e| {
            ExecutionError::InvalidToken {
                token: intent.contract.to_string(),
                reason: e.to_string(),
            }
        })?;

        let prepared = self.prepare(route, token, intent).await?;

        if self.config.dry_run {
            info!(
                ticker = %intent.ticker,
                direction = ?intent.direction,
                amount_in = %prepared.amount_in_dec,
                amount_out = %prepared.amount_out_dec,
                min_out = %prepared.min_out,
                "Dry run, swap not broadcast"
            );
            return Ok(ExecutionReport {
                tx_hash: format!("dry-run-{}", Uuid::new_v4()),
                amount_in: prepared.amount_in_dec,
                amount_out: prepared.amount_out_dec,
                fill_price: prepared.fill_price,
                attempts: 0,
                simulated: true,
            });
        }

        let network_price = route.dex.gas_price().await.map_err(submission_failed)?;
        let gas_price = self.config.gas.initial_price(network_price).map_err(|spike| {
            warn!(
                network = %intent.network,
                network_price = spike.network_price,
                ceiling = spike.ceiling,
                "Gas spike, refusing to submit"
            );
            ExecutionError::Failed {
                reason: ExecutionFailureReason::GasSpike,
                attempts: 0,
                detail: format!("network gas price {} above ceiling {}", spike.network_price, spike.ceiling),
            }
        })?;

        let out_token = prepared.path[1];
        let mut slot = self.nonces.acquire(route.dex.chain_id(), route.dex.wallet()).await;
        self.ensure_allowance(route, &mut slot, prepared.path[0], prepared.amount_in, gas_price)
            .await?;
        let before = match route.dex.balance_of(out_token, route.dex.wallet()).await {
            Ok(balance) => Some(balance),
            Err(e) => {
                warn!(token = %out_token, error = %e, "Pre-swap balance read failed");
                None
            }
        };
        let (hash, attempts) = self
            .broadcast(route, &mut slot, &prepared, gas_price, intent)
            .await?;
        let received = self.received(route, out_token, before, &prepared).await;
        drop(slot);

        let amount_out = from_units(received, prepared.decimals_out).unwrap_or(prepared.amount_out_dec);
        let fill_price = fill_price(intent.direction, prepared.amount_in_dec, amount_out).unwrap_or_else(|| {
            warn!(tx = %hash, received = %received, "Received amount below decimal precision, using quoted price");
            prepared.fill_price
        });

        info!(
            ticker = %intent.ticker,
            direction = ?intent.direction,
            tx = %hash,
            attempts,
            quoted_out = %prepared.amount_out_dec,
            amount_out = %amount_out,
            fill_price = %fill_price,
            "Swap confirmed"
        );
        Ok(ExecutionReport {
            tx_hash: hash.to_string(),
            amount_in: prepared.amount_in_dec,
            amount_out,
            fill_price,
            attempts,
            simulated: false,
        })
    }
}

/// USD per token for a swap of `amount_in` into `amount_out`.
fn fill_price(direction: TradeDirection, amount_in: Decimal, amount_out: Decimal) -> Option<Decimal> {
    if amount_in.is_zero() || amount_out.is_zero() {
        return None;
    }
    match direction {
        TradeDirection::Buy => amount_in.checked_div(amount_out),
        TradeDirection::Sell => amount_out.checked_div(amount_in),
    }
}

/// Map a revert or RPC message to a failure reason.
fn classify(message: &str, fallback: ExecutionFailureReason) -> ExecutionFailureReason {
    let upper = message.to_ascii_uppercase();
    if upper.contains(INSUFFICIENT_OUTPUT) {
        ExecutionFailureReason::SlippageExceeded
    } else if upper.contains("TIMEOUT") || upper.contains("TIMED OUT") {
        ExecutionFailureReason::Timeout
    } else {
        fallback
    }
}

fn quote_failed(e: Error) -> ExecutionError {
    ExecutionError::QuoteFailed(e.to_string())
}

fn submission_failed(e: Error) -> ExecutionError {
    ExecutionError::SubmissionFailed(e.to_string())
}
