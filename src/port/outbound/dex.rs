//! DEX execution ports.
//!
//! [`DexRouter`] is the chain-facing boundary: quotes, gas, nonces,
//! broadcast and confirmation polling in raw token units. [`TradeExecutor`]
//! is what the rebalancing engine sees: an approved intent in, a confirmed
//! fill out.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{ContractAddress, Network, PositionId, Price, TradeDirection};
use crate::error::{ExecutionError, Result};

/// A fully specified swap or approval transaction ready for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapTransaction {
    pub to: Address,
    pub input: Bytes,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub chain_id: u64,
}

/// Confirmation state of a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed { reason: String },
}

/// Chain-facing DEX router for one network and wallet.
#[async_trait]
pub trait DexRouter: Send + Sync {
    /// Router name for logging.
    fn name(&self) -> &'static str;

    /// Address of the signing wallet.
    fn wallet(&self) -> Address;

    fn chain_id(&self) -> u64;

    /// ERC-20 decimals of `token`.
    async fn decimals(&self, token: Address) -> Result<u8>;

    /// ERC-20 balance of `owner`.
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256>;

    /// ERC-20 allowance granted by `owner` to `spender`.
    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256>;

    /// Expected output for swapping `amount_in` along `path` through `router`.
    async fn quote(&self, router: Address, path: &[Address], amount_in: U256) -> Result<U256>;

    /// Current network gas price in wei.
    async fn gas_price(&self) -> Result<u128>;

    /// Gas estimate for `tx` (gas limit and price fields are ignored).
    async fn estimate_gas(&self, tx: &SwapTransaction) -> Result<u64>;

    /// Next nonce for the wallet, including pending transactions.
    async fn pending_nonce(&self) -> Result<u64>;

    /// Sign and broadcast `tx`, returning its hash.
    async fn submit(&self, tx: &SwapTransaction) -> Result<B256>;

    /// Poll the confirmation state of a broadcast transaction.
    async fn poll(&self, hash: B256) -> Result<TxStatus>;
}

/// An approved buy or sell handed to the execution router.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionIntent {
    /// Position being sold, `None` for buys.
    pub position_id: Option<PositionId>,
    pub ticker: String,
    pub contract: ContractAddress,
    pub network: Network,
    pub direction: TradeDirection,
    /// Quote-token amount for buys, token quantity for sells.
    pub amount: Decimal,
    /// Last observed USD price, used for logging and simulated fills.
    pub reference_price: Price,
    /// Requested slippage tolerance; the router enforces its floor.
    pub slippage: Option<Decimal>,
}

/// Outcome of a confirmed execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub tx_hash: String,
    /// Amount spent (quote for buys, tokens for sells).
    pub amount_in: Decimal,
    /// Amount received (tokens for buys, quote for sells), as measured by
    /// the wallet's balance change once confirmed.
    pub amount_out: Decimal,
    /// USD per token realized by the swap.
    pub fill_price: Price,
    pub attempts: u32,
    pub simulated: bool,
}

impl ExecutionReport {
    /// USD value moved by the swap (spent on buys, received on sells).
    #[must_use]
    pub fn quote_amount(&self, direction: TradeDirection) -> Decimal {
        match direction {
            TradeDirection::Buy => self.amount_in,
            TradeDirection::Sell => self.amount_out,
        }
    }
}

/// Executes approved intents to confirmation.
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    /// Execute `intent`, returning only once the transaction is confirmed.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecutionError`] when no attempt confirmed; the caller
    /// must leave the ledger unchanged.
    async fn execute(
        &self,
        intent: &ExecutionIntent,
    ) -> std::result::Result<ExecutionReport, ExecutionError>;
}
