//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! Ports define the extension points in the hexagonal architecture.
//! They are traits that adapters implement to integrate with external
//! systems (market data, scoring oracle, DEX, storage, notifications).
//!
//! # Architecture
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │      Application        │
//!                    │                         │
//!     ┌──────────────┤  Domain + Port          ├──────────────┐
//!     │              │                         │              │
//!     │              └─────────────────────────┘              │
//!     │                         │                             │
//!     ▼                         ▼                             ▼
//! ┌─────────┐            ┌─────────────┐              ┌───────────┐
//! │ Market  │            │   Store     │              │   DEX     │
//! │ Adapter │            │   Adapter   │              │  Adapter  │
//! └─────────┘            └─────────────┘              └───────────┘
//! ```

pub mod outbound;

pub use outbound::dex::{
    DexRouter, ExecutionIntent, ExecutionReport, SwapTransaction, TradeExecutor, TxStatus,
};
pub use outbound::llm::Llm;
pub use outbound::market::{MarketData, TokenMetrics};
pub use outbound::notifier::{Event, LogNotifier, Notifier, NotifierRegistry};
pub use outbound::oracle::{ScoreResponse, ScoringOracle, ScoringRequest};
pub use outbound::store::{PerformanceSource, TradeStore};
