//! Market-data port.
//!
//! The intake validator, price monitor and rebalancing engine read token
//! age, liquidity and price through this trait. Implementations wrap a
//! specific provider (e.g. DexScreener) and handle rate limiting.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::domain::{ContractAddress, ContractRef, Network, Price, UsdAmount};
use crate::error::{Error, Result};

/// Live metrics for one token contract.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenMetrics {
    pub contract: ContractAddress,
    pub network: Network,
    pub price_usd: Price,
    pub liquidity_usd: UsdAmount,
    pub volume_24h_usd: UsdAmount,
    /// 24h price change as a fraction (0.1 = +10%).
    pub price_change_24h: Option<Decimal>,
    pub market_cap_usd: Option<UsdAmount>,
    /// When the token's primary pool was created.
    pub created_at: Option<DateTime<Utc>>,
}

impl TokenMetrics {
    /// Token age at `now`, if the creation time is known.
    #[must_use]
    pub fn age_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.created_at.map(|created| now - created)
    }
}

/// Provider of token age, liquidity and price.
///
/// Only [`metrics`](Self::metrics) and [`resolve_ticker`](Self::resolve_ticker)
/// are required; the narrower lookups derive from them.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &'static str;

    /// Maximum number of contracts per batched price request.
    fn batch_limit(&self) -> usize {
        30
    }

    /// Fetch full metrics for one contract.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unreachable or knows no pool for
    /// the contract.
    async fn metrics(&self, contract: &ContractAddress, network: &Network) -> Result<TokenMetrics>;

    /// Resolve a ticker symbol to candidate contracts.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unreachable.
    async fn resolve_ticker(&self, ticker: &str) -> Result<Vec<ContractRef>>;

    /// Age of the token.
    ///
    /// # Errors
    ///
    /// Returns an error if metrics are unavailable or carry no creation time.
    async fn token_age(&self, contract: &ContractAddress, network: &Network) -> Result<Duration> {
        let metrics = self.metrics(contract, network).await?;
        metrics
            .age_at(Utc::now())
            .ok_or_else(|| Error::MarketData(format!("no creation time for {contract}")))
    }

    /// Pool liquidity in USD.
    ///
    /// # Errors
    ///
    /// Returns an error if metrics are unavailable.
    async fn liquidity(&self, contract: &ContractAddress, network: &Network) -> Result<UsdAmount> {
        Ok(self.metrics(contract, network).await?.liquidity_usd)
    }

    /// Current USD price.
    ///
    /// # Errors
    ///
    /// Returns an error if metrics are unavailable.
    async fn price(&self, contract: &ContractAddress, network: &Network) -> Result<Price> {
        Ok(self.metrics(contract, network).await?.price_usd)
    }

    /// Prices for a batch of contracts on one network.
    ///
    /// Contracts the provider cannot price are absent from the result. The
    /// default implementation issues one lookup per contract.
    ///
    /// # Errors
    ///
    /// Returns an error only if the whole batch failed.
    async fn prices(
        &self,
        network: &Network,
        contracts: &[ContractAddress],
    ) -> Result<HashMap<ContractAddress, Price>> {
        let mut prices = HashMap::with_capacity(contracts.len());
        let mut last_error = None;
        for contract in contracts {
            match self.price(contract, network).await {
                Ok(price) => {
                    prices.insert(contract.clone(), price);
                }
                Err(e) => last_error = Some(e),
            }
        }
        match last_error {
            Some(e) if prices.is_empty() && !contracts.is_empty() => Err(e),
            _ => Ok(prices),
        }
    }
}
