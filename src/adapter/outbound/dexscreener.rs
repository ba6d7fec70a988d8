//! DexScreener market data.
//!
//! Implements [`MarketData`] over the public DexScreener REST API. Token
//! lookups use `tokens/v1/{chain}/{addresses}`, which accepts up to 30
//! comma-separated addresses per request; ticker resolution uses the pair
//! search endpoint. When a token trades in several pools, the most liquid
//! pool supplies its metrics.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::domain::signal::normalize_ticker;
use crate::domain::{ContractAddress, ContractRef, Network, Price};
use crate::error::{Error, Result};
use crate::port::{MarketData, TokenMetrics};

/// Public API root.
pub const DEFAULT_BASE_URL: &str = "https://api.dexscreener.com";

/// Addresses per `tokens/v1` request.
const TOKENS_PER_REQUEST: usize = 30;

/// DexScreener REST client.
#[derive(Debug, Clone)]
pub struct DexScreener {
    client: Client,
    base_url: String,
}

impl DexScreener {
    /// Create a client against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn token_pairs(&self, network: &Network, contracts: &[ContractAddress]) -> Result<Vec<Pair>> {
        let joined = contracts
            .iter()
            .map(ContractAddress::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/tokens/v1/{}/{}", self.base_url, network, joined);
        let pairs = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::MarketData(e.to_string()))?
            .json::<Vec<Pair>>()
            .await?;
        debug!(network = %network, requested = contracts.len(), pairs = pairs.len(), "DexScreener token lookup");
        Ok(pairs)
    }
}

#[async_trait]
impl MarketData for DexScreener {
    fn name(&self) -> &'static str {
        "dexscreener"
    }

    fn batch_limit(&self) -> usize {
        TOKENS_PER_REQUEST
    }

    async fn metrics(&self, contract: &ContractAddress, network: &Network) -> Result<TokenMetrics> {
        let pairs = self.token_pairs(network, std::slice::from_ref(contract)).await?;
        most_liquid_by_token(pairs)
            .remove(contract)
            .and_then(|pair| pair.metrics(network))
            .ok_or_else(|| Error::MarketData(format!("no priced pool for {contract} on {network}")))
    }

    async fn resolve_ticker(&self, ticker: &str) -> Result<Vec<ContractRef>> {
        let url = format!("{}/latest/dex/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("q", ticker)])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::MarketData(e.to_string()))?
            .json::<SearchResponse>()
            .await?;
        Ok(contracts_for_ticker(ticker, &response.pairs))
    }

    async fn prices(
        &self,
        network: &Network,
        contracts: &[ContractAddress],
    ) -> Result<HashMap<ContractAddress, Price>> {
        let mut prices = HashMap::with_capacity(contracts.len());
        for chunk in contracts.chunks(TOKENS_PER_REQUEST) {
            let pairs = self.token_pairs(network, chunk).await?;
            for (contract, pair) in most_liquid_by_token(pairs) {
                if let Some(price) = pair.price_usd.filter(|p| *p > Decimal::ZERO) {
                    prices.insert(contract, price);
                }
            }
        }
        Ok(prices)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    pairs: Vec<Pair>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pair {
    chain_id: String,
    base_token: PairToken,
    #[serde(default)]
    price_usd: Option<Decimal>,
    #[serde(default)]
    liquidity: Option<Liquidity>,
    #[serde(default)]
    volume: Option<Window>,
    #[serde(default)]
    price_change: Option<Window>,
    #[serde(default)]
    market_cap: Option<Decimal>,
    #[serde(default)]
    pair_created_at: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct PairToken {
    address: String,
    #[serde(default)]
    symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Liquidity {
    #[serde(default)]
    usd: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
struct Window {
    #[serde(default)]
    h24: Option<Decimal>,
}

impl Pair {
    fn liquidity_usd(&self) -> Decimal {
        self.liquidity
            .as_ref()
            .and_then(|l| l.usd)
            .unwrap_or(Decimal::ZERO)
    }

    fn metrics(&self, network: &Network) -> Option<TokenMetrics> {
        let price_usd = self.price_usd.filter(|p| *p > Decimal::ZERO)?;
        Some(TokenMetrics {
            contract: ContractAddress::new(&self.base_token.address),
            network: network.clone(),
            price_usd,
            liquidity_usd: self.liquidity_usd(),
            volume_24h_usd: self
                .volume
                .as_ref()
                .and_then(|v| v.h24)
                .unwrap_or(Decimal::ZERO),
            // Reported in percent.
            price_change_24h: self
                .price_change
                .as_ref()
                .and_then(|c| c.h24)
                .map(|pct| pct / Decimal::ONE_HUNDRED),
            market_cap_usd: self.market_cap,
            created_at: self
                .pair_created_at
                .and_then(DateTime::<Utc>::from_timestamp_millis),
        })
    }
}

/// Keep the most liquid pool per base token.
fn most_liquid_by_token(pairs: Vec<Pair>) -> HashMap<ContractAddress, Pair> {
    let mut best: HashMap<ContractAddress, Pair> = HashMap::new();
    for pair in pairs {
        let key = ContractAddress::new(&pair.base_token.address);
        match best.get(&key) {
            Some(current) if current.liquidity_usd() >= pair.liquidity_usd() => {}
            _ => {
                best.insert(key, pair);
            }
        }
    }
    best
}

/// Distinct contracts whose base symbol matches `ticker`, most liquid first.
fn contracts_for_ticker(ticker: &str, pairs: &[Pair]) -> Vec<ContractRef> {
    let wanted = normalize_ticker(ticker);
    let mut seen: HashMap<(String, ContractAddress), Decimal> = HashMap::new();
    for pair in pairs {
        if normalize_ticker(&pair.base_token.symbol) != wanted {
            continue;
        }
        let key = (
            pair.chain_id.to_ascii_lowercase(),
            ContractAddress::new(&pair.base_token.address),
        );
        let liquidity = pair.liquidity_usd();
        let entry = seen.entry(key).or_insert(liquidity);
        *entry = (*entry).max(liquidity);
    }

    let mut ranked: Vec<_> = seen.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
        .into_iter()
        .map(|((chain, contract), _)| ContractRef::new(&wanted, contract, Network::new(chain)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const TOKENS_RESPONSE: &str = r#"[
        {
            "chainId": "base",
            "dexId": "uniswap",
            "pairAddress": "0xpool1",
            "baseToken": {"address": "0xAbC", "name": "Token X", "symbol": "TOKENX"},
            "quoteToken": {"address": "0xusdc", "name": "USD Coin", "symbol": "USDC"},
            "priceUsd": "1.25",
            "volume": {"h24": 120000.5},
            "priceChange": {"h24": -12.5},
            "liquidity": {"usd": 300000},
            "marketCap": 5000000,
            "pairCreatedAt": 1700000000000
        },
        {
            "chainId": "base",
            "dexId": "aerodrome",
            "pairAddress": "0xpool2",
            "baseToken": {"address": "0xabc", "name": "Token X", "symbol": "TOKENX"},
            "quoteToken": {"address": "0xweth", "name": "Wrapped Ether", "symbol": "WETH"},
            "priceUsd": "1.20",
            "liquidity": {"usd": 1000}
        }
    ]"#;

    #[test]
    fn picks_most_liquid_pool() {
        let pairs: Vec<Pair> = serde_json::from_str(TOKENS_RESPONSE).unwrap();
        let best = most_liquid_by_token(pairs);
        let pair = &best[&ContractAddress::new("0xabc")];
        let metrics = pair.metrics(&Network::new("base")).unwrap();
        assert_eq!(metrics.price_usd, dec!(1.25));
        assert_eq!(metrics.liquidity_usd, dec!(300000));
        assert_eq!(metrics.volume_24h_usd, dec!(120000.5));
        assert_eq!(metrics.price_change_24h, Some(dec!(-0.125)));
        assert_eq!(metrics.market_cap_usd, Some(dec!(5000000)));
        assert_eq!(
            metrics.created_at.map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn unpriced_pool_yields_no_metrics() {
        let json = r#"{"chainId": "base", "baseToken": {"address": "0x1", "symbol": "A"}}"#;
        let pair: Pair = serde_json::from_str(json).unwrap();
        assert!(pair.metrics(&Network::new("base")).is_none());
    }

    #[test]
    fn resolves_matching_symbols_only() {
        let json = r#"{"pairs": [
            {"chainId": "base", "baseToken": {"address": "0xa", "symbol": "TOKENX"}, "liquidity": {"usd": 10}},
            {"chainId": "base", "baseToken": {"address": "0xa", "symbol": "TOKENX"}, "liquidity": {"usd": 50}},
            {"chainId": "ethereum", "baseToken": {"address": "0xb", "symbol": "tokenx"}, "liquidity": {"usd": 900}},
            {"chainId": "base", "baseToken": {"address": "0xc", "symbol": "TOKENXY"}, "liquidity": {"usd": 5000}}
        ]}"#;
        let response: SearchResponse = serde_json::from_str(json).unwrap();
        let resolved = contracts_for_ticker("$tokenx", &response.pairs);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].contract, ContractAddress::new("0xb"));
        assert_eq!(resolved[0].network, Network::new("ethereum"));
        assert_eq!(resolved[1].contract, ContractAddress::new("0xa"));
        assert!(resolved.iter().all(|c| c.ticker == "TOKENX"));
    }
}
