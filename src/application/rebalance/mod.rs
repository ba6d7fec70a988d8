//! Rebalancing: per-position rules, eviction ranking, and the engine loop.

mod engine;
mod journal;
mod performance;
pub mod rules;

pub use engine::{
    AdmittedSignal, BuyOutcome, DecisionOutcome, EngineInput, RebalanceConfig, RebalancingEngine,
};
pub use journal::DecisionJournal;
pub use performance::{worst_performer, Ranked};
pub use rules::{Action, RuleConfig};
