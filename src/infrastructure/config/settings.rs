//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all application settings.
//! Configuration is loaded from a TOML file; secrets such as
//! `WALLET_PRIVATE_KEY` come only from the environment.
//!
//! # Example
//!
//! ```no_run
//! use signalbook::infrastructure::config::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use super::execution::ExecutionSettings;
use super::llm::LlmConfig;
use super::logging::LoggingConfig;
use super::portfolio::PortfolioConfig;
use super::strategy::{GateSettings, IntakeConfig, MonitorSettings, RebalanceSettings};
use crate::error::{ConfigError, Result};

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Capacity limits and buy size.
    #[serde(default)]
    pub portfolio: PortfolioConfig,

    /// Age, liquidity, market-cap and volume filters.
    #[serde(default)]
    pub intake: IntakeConfig,

    #[serde(default)]
    pub gate: GateSettings,

    /// Take-profit, stop-loss and eviction windows.
    #[serde(default)]
    pub rebalance: RebalanceSettings,

    #[serde(default)]
    pub monitor: MonitorSettings,

    #[serde(default)]
    pub execution: ExecutionSettings,

    /// Model behind the scoring oracle.
    #[serde(default)]
    pub llm: LlmConfig,

    /// SQLite database path. Empty keeps records in memory.
    #[serde(default = "default_database_path")]
    pub database: String,

    /// Quote and build transactions but never broadcast them.
    #[serde(default)]
    pub dry_run: bool,

    /// Loaded from `WALLET_PRIVATE_KEY`.
    #[serde(skip)]
    pub private_key: Option<String>,
}

fn default_database_path() -> String {
    "signalbook.db".to_string()
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

fn is_fraction(value: Decimal) -> bool {
    (Decimal::ZERO..=Decimal::ONE).contains(&value)
}

impl Config {
    /// Parse configuration from TOML content.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;

        // Private key only from the environment, never from the file.
        config.private_key = std::env::var("WALLET_PRIVATE_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the TOML is malformed,
    /// or validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Check that values are within acceptable ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !self.logging.is_known_format() {
            return Err(invalid("logging.format", "must be 'pretty' or 'json'").into());
        }

        let portfolio = &self.portfolio;
        if portfolio.global_cap == 0 {
            return Err(invalid("portfolio.global_cap", "must be greater than 0").into());
        }
        if portfolio.position_size_usd <= Decimal::ZERO {
            return Err(invalid("portfolio.position_size_usd", "must be greater than 0").into());
        }
        if portfolio.initial_balance_usd < Decimal::ZERO {
            return Err(invalid("portfolio.initial_balance_usd", "must be 0 or greater").into());
        }
        if portfolio.agents.iter().any(|a| a.name.trim().is_empty()) {
            return Err(invalid("portfolio.agents", "agent name must not be empty").into());
        }

        let intake = &self.intake;
        if intake.min_liquidity_usd < Decimal::ZERO {
            return Err(invalid("intake.min_liquidity_usd", "must be 0 or greater").into());
        }
        if let (Some(min), Some(max)) = (intake.min_market_cap_usd, intake.max_market_cap_usd) {
            if min > max {
                return Err(invalid(
                    "intake.max_market_cap_usd",
                    "must be >= min_market_cap_usd",
                )
                .into());
            }
        }

        if !self.gate.threshold.is_finite() || !(0.0..=1.0).contains(&self.gate.threshold) {
            return Err(invalid("gate.threshold", "must be within [0, 1]").into());
        }
        if self.gate.timeout_secs == 0 {
            return Err(invalid("gate.timeout_secs", "must be greater than 0").into());
        }

        let rebalance = &self.rebalance;
        if rebalance.take_profit_pct <= Decimal::ZERO {
            return Err(invalid("rebalance.take_profit_pct", "must be greater than 0").into());
        }
        if rebalance.stop_loss_pct >= Decimal::ZERO || rebalance.stop_loss_pct <= -Decimal::ONE {
            return Err(invalid("rebalance.stop_loss_pct", "must be within (-1, 0)").into());
        }
        if rebalance.scheduled_window_days == 0 || rebalance.overflow_window_days == 0 {
            return Err(invalid("rebalance.window_days", "must be greater than 0").into());
        }

        if self.monitor.interval_secs == 0 {
            return Err(invalid("monitor.interval_secs", "must be greater than 0").into());
        }
        if self.monitor.batch_size == 0 {
            return Err(invalid("monitor.batch_size", "must be greater than 0").into());
        }

        let execution = &self.execution;
        if !is_fraction(execution.default_slippage) {
            return Err(invalid("execution.default_slippage", "must be between 0 and 1").into());
        }
        if !is_fraction(execution.slippage_floor) {
            return Err(invalid("execution.slippage_floor", "must be between 0 and 1").into());
        }
        if execution.gas_margin < Decimal::ZERO || execution.retry_gas_bump <= Decimal::ZERO {
            return Err(invalid(
                "execution.gas_margin",
                "margin must be 0 or greater and retry bump greater than 0",
            )
            .into());
        }
        if execution.max_gas_price_gwei.is_some_and(|g| g <= Decimal::ZERO) {
            return Err(invalid("execution.max_gas_price_gwei", "must be greater than 0").into());
        }
        if execution.max_attempts == 0 {
            return Err(invalid("execution.max_attempts", "must be greater than 0").into());
        }
        if execution.confirmation_timeout_secs == 0 || execution.poll_interval_ms == 0 {
            return Err(invalid(
                "execution.confirmation_timeout_secs",
                "timeout and poll interval must be greater than 0",
            )
            .into());
        }
        if execution.network.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "execution.network",
            }
            .into());
        }
        if execution.rpc_url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "execution.rpc_url",
            }
            .into());
        }

        let llm = self.llm.active();
        if !(0.0..=2.0).contains(&llm.temperature) {
            return Err(invalid("llm.temperature", "must be within [0, 2]").into());
        }
        if llm.max_tokens == 0 {
            return Err(invalid("llm.max_tokens", "must be greater than 0").into());
        }
        Ok(())
    }

    /// Initialize logging with the configured settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}
