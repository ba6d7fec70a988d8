//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`domain`] - Builders for signals, metrics and admitted buys.
//! - [`market`] - [`MockMarket`](market::MockMarket), a programmable
//!   market-data provider.
//! - [`oracle`] - Scripted scoring oracle and LLM.
//! - [`dex`] - Scripted chain router and trade executor.
//! - [`notifier`] - Notifier that records every event.
//! - [`config`] - Canonical test configuration.

pub mod config;
pub mod dex;
pub mod domain;
pub mod market;
pub mod notifier;
pub mod oracle;
