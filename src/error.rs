use thiserror::Error;

use crate::domain::error::DomainError;
use crate::domain::{CapacityScope, PositionId, PositionStatus};

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

/// Why an execution attempt was surfaced as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionFailureReason {
    /// Output fell below the minimum-output bound.
    SlippageExceeded,
    /// Network gas price above the configured ceiling.
    GasSpike,
    /// Transaction mined but reverted.
    Reverted,
    /// No confirmation within the confirmation timeout.
    Timeout,
}

impl std::fmt::Display for ExecutionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SlippageExceeded => "SlippageExceeded",
            Self::GasSpike => "GasSpike",
            Self::Reverted => "Reverted",
            Self::Timeout => "Timeout",
        };
        f.write_str(name)
    }
}

/// Execution-related errors with structured variants.
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    #[error("execution failed ({reason}) after {attempts} attempt(s): {detail}")]
    Failed {
        reason: ExecutionFailureReason,
        attempts: u32,
        detail: String,
    },

    #[error("no route configured for network '{0}'")]
    UnsupportedNetwork(String),

    #[error("invalid token '{token}': {reason}")]
    InvalidToken { token: String, reason: String },

    #[error("failed to obtain quote: {0}")]
    QuoteFailed(String),

    #[error("failed to submit transaction: {0}")]
    SubmissionFailed(String),
}

impl ExecutionError {
    /// The surfaced failure reason, if this is a terminal attempt failure.
    #[must_use]
    pub fn failure_reason(&self) -> Option<ExecutionFailureReason> {
        match self {
            Self::Failed { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Position ledger errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("{scope} capacity exceeded")]
    CapacityExceeded { scope: CapacityScope },

    #[error("position already held for agent {agent} and contract {contract}")]
    DuplicatePosition { agent: String, contract: String },

    #[error("position {0} not found")]
    PositionNotFound(PositionId),

    #[error("reservation {0} not found")]
    ReservationNotFound(u64),

    #[error("cannot {action} position {position} in status {from}")]
    InvalidTransition {
        position: PositionId,
        from: PositionStatus,
        action: &'static str,
    },

    #[error("ledger invariant violated: {0}")]
    InvariantViolation(String),

    #[error("ledger halted after invariant violation")]
    Halted,

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl LedgerError {
    /// Returns true for errors that require operator intervention.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation(_) | Self::Halted)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("market data error: {0}")]
    MarketData(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, Error>;
