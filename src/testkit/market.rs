//! Programmable [`MarketData`] provider.
//!
//! Metrics are set per contract and can be changed mid-test to drive price
//! moves. Contracts marked as failing return an error from every lookup.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;

use super::domain;
use crate::domain::{ContractAddress, ContractRef, Network};
use crate::error::{Error, Result};
use crate::port::{MarketData, TokenMetrics};

#[derive(Default)]
pub struct MockMarket {
    metrics: RwLock<HashMap<ContractAddress, TokenMetrics>>,
    tickers: RwLock<HashMap<String, Vec<ContractRef>>>,
    failing: RwLock<HashSet<ContractAddress>>,
    metrics_calls: AtomicUsize,
    price_batches: AtomicUsize,
}

impl MockMarket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register healthy metrics for `ticker` at `price`, resolvable by ticker.
    pub fn with_token(self, ticker: &str, price: Decimal) -> Self {
        self.set_metrics(domain::metrics(ticker, price));
        self.tickers
            .write()
            .entry(ticker.to_ascii_uppercase())
            .or_default()
            .push(domain::contract_ref(ticker));
        self
    }

    /// Register explicit metrics, resolvable under `ticker`.
    pub fn with_metrics(self, ticker: &str, metrics: TokenMetrics) -> Self {
        self.tickers
            .write()
            .entry(ticker.to_ascii_uppercase())
            .or_default()
            .push(ContractRef::new(ticker, metrics.contract.clone(), metrics.network.clone()));
        self.set_metrics(metrics);
        self
    }

    pub fn set_metrics(&self, metrics: TokenMetrics) {
        self.metrics.write().insert(metrics.contract.clone(), metrics);
    }

    /// Move the price of `ticker`'s contract.
    pub fn set_price(&self, ticker: &str, price: Decimal) {
        if let Some(m) = self.metrics.write().get_mut(&domain::contract(ticker)) {
            m.price_usd = price;
        }
    }

    /// Make every lookup for `ticker`'s contract fail.
    pub fn fail(&self, ticker: &str) {
        self.failing.write().insert(domain::contract(ticker));
    }

    pub fn recover(&self, ticker: &str) {
        self.failing.write().remove(&domain::contract(ticker));
    }

    pub fn metrics_calls(&self) -> usize {
        self.metrics_calls.load(Ordering::SeqCst)
    }

    pub fn price_batches(&self) -> usize {
        self.price_batches.load(Ordering::SeqCst)
    }

    fn lookup(&self, contract: &ContractAddress) -> Result<TokenMetrics> {
        if self.failing.read().contains(contract) {
            return Err(Error::MarketData(format!("provider unavailable for {contract}")));
        }
        self.metrics
            .read()
            .get(contract)
            .cloned()
            .ok_or_else(|| Error::MarketData(format!("no pool for {contract}")))
    }
}

#[async_trait]
impl MarketData for MockMarket {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn metrics(&self, contract: &ContractAddress, _network: &Network) -> Result<TokenMetrics> {
        self.metrics_calls.fetch_add(1, Ordering::SeqCst);
        self.lookup(contract)
    }

    async fn resolve_ticker(&self, ticker: &str) -> Result<Vec<ContractRef>> {
        Ok(self
            .tickers
            .read()
            .get(&ticker.trim_start_matches('$').to_ascii_uppercase())
            .cloned()
            .unwrap_or_default())
    }

    async fn prices(
        &self,
        _network: &Network,
        contracts: &[ContractAddress],
    ) -> Result<HashMap<ContractAddress, Decimal>> {
        self.price_batches.fetch_add(1, Ordering::SeqCst);
        Ok(contracts
            .iter()
            .filter_map(|c| self.lookup(c).ok().map(|m| (c.clone(), m.price_usd)))
            .collect())
    }
}
