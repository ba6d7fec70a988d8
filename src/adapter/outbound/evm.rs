//! EVM DEX router over an alloy provider.
//!
//! Implements [`DexRouter`] against a JSON-RPC endpoint with a local
//! private-key signer. Reads go through `sol!` contract bindings; swap and
//! approval transactions are sent as raw calldata so builder suffixes
//! survive untouched.

use std::str::FromStr;

use alloy_contract::CallBuilder;
use alloy_primitives::{Address, B256, U256};
use alloy_provider::network::EthereumWallet;
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::sol;
use async_trait::async_trait;
use tracing::debug;

use crate::error::{ConfigError, Error, Result};
use crate::port::{DexRouter, SwapTransaction, TxStatus};

sol! {
    #[sol(rpc)]
    contract IERC20Metadata {
        function decimals() external view returns (uint8);
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
    }

    #[sol(rpc)]
    contract IUniswapV2RouterQuote {
        function getAmountsOut(uint256 amountIn, address[] calldata path)
            external view returns (uint256[] memory amounts);
    }
}

/// Chain connection for one network and wallet.
pub struct EvmRouter {
    provider: DynProvider,
    wallet: Address,
    chain_id: u64,
}

impl EvmRouter {
    /// Connect to `rpc_url` signing with `private_key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key or URL is invalid.
    pub fn connect(rpc_url: &str, private_key: &str, chain_id: u64) -> Result<Self> {
        if private_key.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "WALLET_PRIVATE_KEY",
            }
            .into());
        }
        let signer = PrivateKeySigner::from_str(private_key.trim())
            .map_err(|e| ConfigError::InvalidValue {
                field: "WALLET_PRIVATE_KEY",
                reason: e.to_string(),
            })?;
        Self::with_signer(rpc_url, signer, chain_id)
    }

    /// Connect with a throwaway key. Reads and quotes work; anything
    /// submitted would come from an unfunded wallet, so use it for dry runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn read_only(rpc_url: &str, chain_id: u64) -> Result<Self> {
        Self::with_signer(rpc_url, PrivateKeySigner::random(), chain_id)
    }

    fn with_signer(rpc_url: &str, signer: PrivateKeySigner, chain_id: u64) -> Result<Self> {
        let wallet = signer.address();
        let url: url::Url = rpc_url.parse().map_err(|e: url::ParseError| ConfigError::InvalidValue {
            field: "execution.rpc_url",
            reason: e.to_string(),
        })?;
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();

        Ok(Self {
            provider,
            wallet,
            chain_id,
        })
    }

    fn raw_call(&self, tx: &SwapTransaction) -> CallBuilder<&DynProvider, ()> {
        CallBuilder::new_raw(&self.provider, tx.input.clone())
            .to(tx.to)
            .from(self.wallet)
            .nonce(tx.nonce)
    }
}

fn rpc_error(context: &str, e: impl std::fmt::Display) -> Error {
    Error::Connection(format!("{context}: {e}"))
}

#[async_trait]
impl DexRouter for EvmRouter {
    fn name(&self) -> &'static str {
        "evm"
    }

    fn wallet(&self) -> Address {
        self.wallet
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn decimals(&self, token: Address) -> Result<u8> {
        IERC20Metadata::new(token, &self.provider)
            .decimals()
            .call()
            .await
            .map_err(|e| rpc_error("decimals", e))
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256> {
        IERC20Metadata::new(token, &self.provider)
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| rpc_error("balanceOf", e))
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        IERC20Metadata::new(token, &self.provider)
            .allowance(owner, spender)
            .call()
            .await
            .map_err(|e| rpc_error("allowance", e))
    }

    async fn quote(&self, router: Address, path: &[Address], amount_in: U256) -> Result<U256> {
        let amounts = IUniswapV2RouterQuote::new(router, &self.provider)
            .getAmountsOut(amount_in, path.to_vec())
            .call()
            .await
            .map_err(|e| rpc_error("getAmountsOut", e))?;
        amounts
            .last()
            .copied()
            .ok_or_else(|| Error::MarketData("router returned no amounts".into()))
    }

    async fn gas_price(&self) -> Result<u128> {
        self.provider
            .get_gas_price()
            .await
            .map_err(|e| rpc_error("gas price", e))
    }

    async fn estimate_gas(&self, tx: &SwapTransaction) -> Result<u64> {
        self.raw_call(tx)
            .estimate_gas()
            .await
            .map_err(|e| rpc_error("estimate gas", e))
    }

    async fn pending_nonce(&self) -> Result<u64> {
        self.provider
            .get_transaction_count(self.wallet)
            .pending()
            .await
            .map_err(|e| rpc_error("nonce", e))
    }

    async fn submit(&self, tx: &SwapTransaction) -> Result<B256> {
        let pending = self
            .raw_call(tx)
            .gas(tx.gas_limit)
            .gas_price(tx.gas_price)
            .send()
            .await
            .map_err(|e| rpc_error("send", e))?;
        let hash = *pending.tx_hash();
        debug!(tx = %hash, nonce = tx.nonce, "Transaction broadcast");
        Ok(hash)
    }

    async fn poll(&self, hash: B256) -> Result<TxStatus> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| rpc_error("receipt", e))?;
        Ok(match receipt {
            None => TxStatus::Pending,
            Some(receipt) if receipt.status() => TxStatus::Confirmed,
            Some(_) => TxStatus::Failed {
                reason: "transaction reverted (status 0)".into(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_key() {
        let err = EvmRouter::connect("http://localhost:8545", "  ", 8453)
            .err()
            .map(|e| e.to_string());
        assert!(err.is_some_and(|e| e.contains("WALLET_PRIVATE_KEY")));
    }

    #[test]
    fn derives_wallet_from_key() {
        // Well-known development key.
        let key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let router = EvmRouter::connect("http://localhost:8545", key, 31337).unwrap();
        assert_eq!(
            router.wallet(),
            Address::from_str("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").unwrap()
        );
        assert_eq!(router.chain_id(), 31337);
    }
}
