//! Builders for domain primitives used across tests.
//!
//! Contract addresses are derived from a short name so tests can write
//! `contract("pepe")` instead of a forty-digit hex string.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::application::rebalance::AdmittedSignal;
use crate::domain::{ConfidenceScore, ContractAddress, ContractRef, SignalEvent, TradeSignal};
use crate::port::TokenMetrics;

/// Network every builder uses.
pub const NETWORK: &str = "base";

/// Deterministic 20-byte hex address for `name`.
pub fn address_hex(name: &str) -> String {
    let mut bytes = [0u8; 20];
    for (i, b) in name.bytes().enumerate() {
        bytes[i % 20] ^= b;
    }
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("0x{hex}")
}

pub fn contract(name: &str) -> ContractAddress {
    ContractAddress::new(address_hex(name))
}

pub fn contract_ref(ticker: &str) -> ContractRef {
    ContractRef::new(ticker, contract(ticker), NETWORK)
}

/// Single-ticker event with the contract pre-resolved.
pub fn event(agent: &str, ticker: &str) -> SignalEvent {
    SignalEvent::new(agent, format!("post-{agent}-{ticker}"), vec![format!("${ticker}")])
        .with_contract(contract_ref(ticker))
}

/// Single-ticker event left for the market provider to resolve.
pub fn unresolved_event(agent: &str, ticker: &str) -> SignalEvent {
    SignalEvent::new(agent, format!("post-{agent}-{ticker}"), vec![format!("${ticker}")])
}

pub fn signal(agent: &str, ticker: &str) -> TradeSignal {
    TradeSignal::new(agent, format!("post-{agent}-{ticker}"), contract_ref(ticker))
}

/// Metrics that clear the default intake criteria.
pub fn metrics(ticker: &str, price: Decimal) -> TokenMetrics {
    TokenMetrics {
        contract: contract(ticker),
        network: NETWORK.into(),
        price_usd: price,
        liquidity_usd: Decimal::from(1_000_000),
        volume_24h_usd: Decimal::from(500_000),
        price_change_24h: None,
        market_cap_usd: Some(Decimal::from(10_000_000)),
        created_at: Some(Utc::now() - Duration::days(30)),
    }
}

pub fn score(value: f64) -> ConfidenceScore {
    ConfidenceScore::try_new(value, "scripted", Utc::now()).unwrap_or_else(|e| panic!("{e}"))
}

/// A buy request as the pipeline would hand it to the engine.
pub fn admitted(agent: &str, ticker: &str, price: Decimal, at: DateTime<Utc>) -> AdmittedSignal {
    AdmittedSignal {
        signal: signal(agent, ticker),
        score: score(0.9),
        metrics: metrics(ticker, price),
        admitted_at: at,
    }
}
