//! Signalbook - social-signal position ledger and rebalancing engine.
//!
//! Turns ticker mentions by tracked agents into a bounded portfolio of
//! on-chain token positions. Each signal passes an intake validator and an
//! oracle-backed confidence gate before the rebalancing engine buys; an
//! hourly price monitor then drives take-profit, graduation, stop-loss and
//! worst-performer eviction.
//!
//! # Architecture
//!
//! - **`domain`** - Venue-agnostic types: positions, signals, scores,
//!   decisions, trade records
//! - **`port`** - Traits the core depends on: market data, scoring oracle,
//!   LLM, DEX router, trade store, notifier
//! - **`application`** - The core: intake, confidence gate, position ledger,
//!   price monitor, rebalancing engine, execution router
//! - **`adapter`** - DexScreener, Anthropic/OpenAI, EVM and SQLite
//!   implementations of the ports
//! - **`infrastructure`** - Configuration, logging and runtime wiring
//!
//! # Example
//!
//! ```no_run
//! use signalbook::infrastructure::bootstrap::{Ports, Runtime};
//! use signalbook::infrastructure::config::Config;
//!
//! # async fn run() -> signalbook::error::Result<()> {
//! let config = Config::load("config.toml")?;
//! let ports = Ports::from_config(&config)?;
//! let runtime = Runtime::assemble(&config, ports)?;
//! let (_signals_tx, signals) = tokio::sync::mpsc::channel(64);
//! runtime.run_until(signals, async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

pub mod adapter;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
