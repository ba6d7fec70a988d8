//! Adapters (hexagonal ports implementations).
//!
//! The inbound side feeds signal events into the pipeline; the outbound
//! side implements market data, scoring, chain execution and persistence.

pub mod inbound;
pub mod outbound;
