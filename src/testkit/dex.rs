//! Scripted chain router and trade executor.
//!
//! [`ScriptedDex`] exercises the real [`ExecutionRouter`] against an
//! in-memory chain: quotes follow a USD price table, and gas, estimate,
//! submit and receipt outcomes can be queued per call. Confirmed swaps
//! credit the wallet with the quoted output less any transfer fee set on
//! the output token. [`ScriptedExecutor`] replaces the router entirely for
//! engine tests and fills every intent at its reference price, minus the
//! same kind of transfer fee on buys.
//!
//! [`ExecutionRouter`]: crate::application::execution::ExecutionRouter

use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use super::domain;
use crate::application::execution::{decode_swap, from_units, to_units, Route};
use crate::domain::TradeDirection;
use crate::error::{Error, ExecutionError, ExecutionFailureReason, Result};
use crate::port::{DexRouter, ExecutionIntent, ExecutionReport, SwapTransaction, TradeExecutor, TxStatus};

/// USD-pegged quote token used by [`ScriptedDex`].
pub const QUOTE_TOKEN: Address = Address::repeat_byte(0x0a);
/// Router contract used by [`ScriptedDex`].
pub const ROUTER: Address = Address::repeat_byte(0x0b);
const WALLET: Address = Address::repeat_byte(0x0c);

/// Token contract address for `ticker`.
pub fn token_address(ticker: &str) -> Address {
    Address::from_str(&domain::address_hex(ticker)).unwrap_or_else(|e| panic!("{e}"))
}

#[derive(Default)]
struct Script {
    gas_prices: VecDeque<u128>,
    estimate_errors: VecDeque<String>,
    submit_errors: VecDeque<String>,
    receipts: VecDeque<TxStatus>,
    quotes: VecDeque<U256>,
}

/// In-memory [`DexRouter`].
pub struct ScriptedDex {
    prices: Mutex<HashMap<Address, Decimal>>,
    decimals: Mutex<HashMap<Address, u8>>,
    allowance: Mutex<U256>,
    gas_price: Mutex<u128>,
    stalled: Mutex<bool>,
    script: Mutex<Script>,
    chain_nonce: AtomicU64,
    nonce_reads: AtomicUsize,
    submitted: Mutex<Vec<SwapTransaction>>,
    balances: Mutex<HashMap<Address, U256>>,
    transfer_fees: Mutex<HashMap<Address, Decimal>>,
    settled: Mutex<HashSet<usize>>,
    unreadable_balances: Mutex<bool>,
}

impl Default for ScriptedDex {
    fn default() -> Self {
        let mut decimals = HashMap::new();
        decimals.insert(QUOTE_TOKEN, 6);
        let mut prices = HashMap::new();
        prices.insert(QUOTE_TOKEN, Decimal::ONE);
        Self {
            prices: Mutex::new(prices),
            decimals: Mutex::new(decimals),
            allowance: Mutex::new(U256::MAX),
            gas_price: Mutex::new(1_000_000_000),
            stalled: Mutex::new(false),
            script: Mutex::new(Script::default()),
            chain_nonce: AtomicU64::new(0),
            nonce_reads: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
            balances: Mutex::new(HashMap::new()),
            transfer_fees: Mutex::new(HashMap::new()),
            settled: Mutex::new(HashSet::new()),
            unreadable_balances: Mutex::new(false),
        }
    }
}

impl ScriptedDex {
    pub fn new() -> Self {
        Self::default()
    }

    /// List `ticker` at `price` USD with 18 decimals.
    pub fn with_token(self, ticker: &str, price: Decimal) -> Self {
        self.set_price(ticker, price);
        self
    }

    pub fn set_price(&self, ticker: &str, price: Decimal) {
        self.prices.lock().insert(token_address(ticker), price);
    }

    pub fn set_decimals(&self, ticker: &str, decimals: u8) {
        self.decimals.lock().insert(token_address(ticker), decimals);
    }

    /// Next `quote` calls return these raw amounts instead of pricing.
    pub fn queue_quotes(&self, amounts: impl IntoIterator<Item = U256>) {
        self.script.lock().quotes.extend(amounts);
    }

    /// Route over this chain, with `fee_on_transfer` tickers flagged.
    pub fn route(self: &Arc<Self>, fee_on_transfer: &[&str]) -> Route {
        Route {
            dex: Arc::clone(self) as Arc<dyn DexRouter>,
            router: ROUTER,
            quote_token: QUOTE_TOKEN,
            fee_on_transfer: fee_on_transfer
                .iter()
                .map(|t| token_address(t))
                .collect::<HashSet<_>>(),
        }
    }

    /// `ticker` keeps `fee` (a fraction) of every transfer into the wallet.
    pub fn set_transfer_fee(&self, ticker: &str, fee: Decimal) {
        self.transfer_fees.lock().insert(token_address(ticker), fee);
    }

    /// Every `balance_of` call fails.
    pub fn hide_balances(&self) {
        *self.unreadable_balances.lock() = true;
    }

    /// Wallet balance of `ticker` in whole tokens.
    pub fn wallet_balance(&self, ticker: &str) -> Decimal {
        let token = token_address(ticker);
        let units = self.balances.lock().get(&token).copied().unwrap_or_default();
        from_units(units, self.decimals_of(token)).unwrap_or_default()
    }

    pub fn set_allowance(&self, allowance: U256) {
        *self.allowance.lock() = allowance;
    }

    pub fn set_gas_price(&self, wei: u128) {
        *self.gas_price.lock() = wei;
    }

    /// Next `gas_price` calls return these before the standing price.
    pub fn queue_gas_prices(&self, prices: impl IntoIterator<Item = u128>) {
        self.script.lock().gas_prices.extend(prices);
    }

    pub fn fail_estimate(&self, message: &str) {
        self.script.lock().estimate_errors.push_back(message.into());
    }

    pub fn fail_submit(&self, message: &str) {
        self.script.lock().submit_errors.push_back(message.into());
    }

    /// Next receipt polls return these in order; afterwards every
    /// transaction confirms.
    pub fn queue_receipts(&self, receipts: impl IntoIterator<Item = TxStatus>) {
        self.script.lock().receipts.extend(receipts);
    }

    /// Every receipt stays pending forever.
    pub fn stall(&self) {
        *self.stalled.lock() = true;
    }

    pub fn submitted(&self) -> Vec<SwapTransaction> {
        self.submitted.lock().clone()
    }

    pub fn nonce_reads(&self) -> usize {
        self.nonce_reads.load(Ordering::SeqCst)
    }

    fn price(&self, token: Address) -> Result<Decimal> {
        self.prices
            .lock()
            .get(&token)
            .copied()
            .ok_or_else(|| Error::MarketData(format!("no pool for {token}")))
    }

    fn decimals_of(&self, token: Address) -> u8 {
        self.decimals.lock().get(&token).copied().unwrap_or(18)
    }

    fn quote_units(&self, path: &[Address], amount_in: U256) -> Result<U256> {
        let (Some(&from), Some(&to)) = (path.first(), path.last()) else {
            return Err(Error::Parse("empty path".into()));
        };
        let amount = from_units(amount_in, self.decimals_of(from))
            .ok_or_else(|| Error::Parse("amount out of range".into()))?;
        let price_out = self.price(to)?;
        if price_out.is_zero() {
            return Ok(U256::ZERO);
        }
        let out = amount * self.price(from)? / price_out;
        to_units(out.round_dp(u32::from(self.decimals_of(to))), self.decimals_of(to))
            .ok_or_else(|| Error::Parse("quote out of range".into()))
    }

    /// Credit the output of the swap behind `hash`, once.
    fn settle(&self, hash: B256) -> Option<()> {
        let index = usize::from(hash[31]).checked_sub(1)?;
        let tx = self.submitted.lock().get(index).cloned()?;
        if !self.settled.lock().insert(index) {
            return None;
        }
        let swap = decode_swap(&tx.input)?;
        let token = *swap.path.last()?;
        let quoted = self.quote_units(&swap.path, swap.amount_in).ok()?;
        let fee = self.transfer_fees.lock().get(&token).copied().unwrap_or_default();
        let decimals = self.decimals_of(token);
        let delivered = from_units(quoted, decimals)? * (Decimal::ONE - fee);
        let delivered = to_units(delivered, decimals)?;
        *self.balances.lock().entry(token).or_default() += delivered;
        Some(())
    }
}

#[async_trait]
impl DexRouter for ScriptedDex {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn wallet(&self) -> Address {
        WALLET
    }

    fn chain_id(&self) -> u64 {
        8453
    }

    async fn decimals(&self, token: Address) -> Result<u8> {
        Ok(self.decimals_of(token))
    }

    async fn balance_of(&self, token: Address, _owner: Address) -> Result<U256> {
        if *self.unreadable_balances.lock() {
            return Err(Error::Connection("balance unavailable".into()));
        }
        Ok(self.balances.lock().get(&token).copied().unwrap_or_default())
    }

    async fn allowance(&self, _token: Address, _owner: Address, _spender: Address) -> Result<U256> {
        Ok(*self.allowance.lock())
    }

    async fn quote(&self, _router: Address, path: &[Address], amount_in: U256) -> Result<U256> {
        if let Some(queued) = self.script.lock().quotes.pop_front() {
            return Ok(queued);
        }
        self.quote_units(path, amount_in)
    }

    async fn gas_price(&self) -> Result<u128> {
        let queued = self.script.lock().gas_prices.pop_front();
        Ok(queued.unwrap_or(*self.gas_price.lock()))
    }

    async fn estimate_gas(&self, _tx: &SwapTransaction) -> Result<u64> {
        match self.script.lock().estimate_errors.pop_front() {
            Some(message) => Err(Error::Connection(message)),
            None => Ok(150_000),
        }
    }

    async fn pending_nonce(&self) -> Result<u64> {
        self.nonce_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.chain_nonce.load(Ordering::SeqCst))
    }

    async fn submit(&self, tx: &SwapTransaction) -> Result<B256> {
        if let Some(message) = self.script.lock().submit_errors.pop_front() {
            return Err(Error::Connection(message));
        }
        let mut submitted = self.submitted.lock();
        submitted.push(tx.clone());
        self.chain_nonce.fetch_max(tx.nonce + 1, Ordering::SeqCst);
        let index = u8::try_from(submitted.len()).unwrap_or(u8::MAX);
        Ok(B256::with_last_byte(index))
    }

    async fn poll(&self, hash: B256) -> Result<TxStatus> {
        if *self.stalled.lock() {
            return Ok(TxStatus::Pending);
        }
        let status = self
            .script
            .lock()
            .receipts
            .pop_front()
            .unwrap_or(TxStatus::Confirmed);
        if status == TxStatus::Confirmed {
            let _ = self.settle(hash);
        }
        Ok(status)
    }
}

/// [`TradeExecutor`] that fills at the intent's reference price.
#[derive(Default)]
pub struct ScriptedExecutor {
    failures: Mutex<VecDeque<ExecutionFailureReason>>,
    blocked: Mutex<HashSet<String>>,
    intents: Mutex<Vec<ExecutionIntent>>,
    transfer_fees: Mutex<HashMap<String, Decimal>>,
    fills: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next executions fail with these reasons, in order.
    pub fn fail_next(&self, reasons: impl IntoIterator<Item = ExecutionFailureReason>) {
        self.failures.lock().extend(reasons);
    }

    /// Every execution for `ticker` fails until unblocked.
    pub fn block(&self, ticker: &str) {
        self.blocked.lock().insert(ticker.to_ascii_uppercase());
    }

    pub fn unblock(&self, ticker: &str) {
        self.blocked.lock().remove(&ticker.to_ascii_uppercase());
    }

    /// Buys of `ticker` deliver `fee` (a fraction) fewer tokens than the
    /// reference price implies.
    pub fn set_transfer_fee(&self, ticker: &str, fee: Decimal) {
        self.transfer_fees.lock().insert(ticker.to_ascii_uppercase(), fee);
    }

    /// Every intent received, including failed ones.
    pub fn intents(&self) -> Vec<ExecutionIntent> {
        self.intents.lock().clone()
    }

    pub fn fills(&self) -> usize {
        self.fills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TradeExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        intent: &ExecutionIntent,
    ) -> std::result::Result<ExecutionReport, ExecutionError> {
        self.intents.lock().push(intent.clone());
        let blocked = self.blocked.lock().contains(&intent.ticker.to_ascii_uppercase());
        let scripted = self.failures.lock().pop_front();
        if let Some(reason) = scripted.or(blocked.then_some(ExecutionFailureReason::Reverted)) {
            return Err(ExecutionError::Failed {
                reason,
                attempts: 2,
                detail: "scripted failure".into(),
            });
        }

        let price = intent.reference_price;
        if price <= Decimal::ZERO {
            return Err(ExecutionError::QuoteFailed("no price".into()));
        }
        let (amount_out, fill_price) = match intent.direction {
            TradeDirection::Buy => {
                let fee = self
                    .transfer_fees
                    .lock()
                    .get(&intent.ticker.to_ascii_uppercase())
                    .copied()
                    .unwrap_or_default();
                let delivered = intent.amount / price * (Decimal::ONE - fee);
                let fill_price = if fee.is_zero() { price } else { intent.amount / delivered };
                (delivered, fill_price)
            }
            TradeDirection::Sell => (intent.amount * price, price),
        };
        let n = self.fills.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ExecutionReport {
            tx_hash: format!("0xfill{n}"),
            amount_in: intent.amount,
            amount_out,
            fill_price,
            attempts: 1,
            simulated: false,
        })
    }
}
