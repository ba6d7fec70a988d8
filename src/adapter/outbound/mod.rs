//! Outbound adapters (driven side).

pub mod dexscreener;
pub mod evm;
pub mod llm;
pub mod memory;
pub mod oracle;
pub mod sqlite;
