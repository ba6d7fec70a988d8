//! Application services (use cases).
//!
//! These services orchestrate domain logic and coordinate adapters
//! to implement the trading pipeline: intake, confidence gate, ledger,
//! price monitor, rebalancing engine and execution router.

pub mod execution;
pub mod gate;
pub mod intake;
pub mod ledger;
pub mod monitor;
pub mod pipeline;
pub mod rebalance;
pub mod stats;
