//! Outbound ports (driven side): interfaces implemented by outbound adapters.
//!
//! These contracts describe infrastructure dependencies such as market data,
//! scoring, DEX execution, storage, and notifications.

pub mod dex;
pub mod llm;
pub mod market;
pub mod notifier;
pub mod oracle;
pub mod store;
