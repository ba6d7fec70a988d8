//! Trading strategy configuration: intake filters, confidence gate,
//! rebalancing rules and the monitor schedule.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::gate::GateConfig;
use crate::application::intake::IntakeCriteria;
use crate::application::monitor::MonitorConfig;
use crate::application::rebalance::{RebalanceConfig, RuleConfig};

/// `[intake]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct IntakeConfig {
    #[serde(default = "default_min_token_age_days")]
    pub min_token_age_days: u32,
    #[serde(default = "default_min_liquidity_usd")]
    pub min_liquidity_usd: Decimal,
    #[serde(default)]
    pub min_market_cap_usd: Option<Decimal>,
    #[serde(default)]
    pub max_market_cap_usd: Option<Decimal>,
    #[serde(default)]
    pub min_volume_24h_usd: Option<Decimal>,
    /// Per-request timeout for the market-data provider.
    #[serde(default = "default_market_timeout_secs")]
    pub market_timeout_secs: u64,
}

const fn default_min_token_age_days() -> u32 {
    2
}

fn default_min_liquidity_usd() -> Decimal {
    Decimal::from(250_000)
}

const fn default_market_timeout_secs() -> u64 {
    10
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            min_token_age_days: default_min_token_age_days(),
            min_liquidity_usd: default_min_liquidity_usd(),
            min_market_cap_usd: None,
            max_market_cap_usd: None,
            min_volume_24h_usd: None,
            market_timeout_secs: default_market_timeout_secs(),
        }
    }
}

impl IntakeConfig {
    #[must_use]
    pub fn criteria(&self) -> IntakeCriteria {
        IntakeCriteria {
            min_token_age: chrono::Duration::days(i64::from(self.min_token_age_days)),
            min_liquidity_usd: self.min_liquidity_usd,
            min_market_cap_usd: self.min_market_cap_usd,
            max_market_cap_usd: self.max_market_cap_usd,
            min_volume_24h_usd: self.min_volume_24h_usd,
        }
    }
}

/// `[gate]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct GateSettings {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_gate_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_threshold() -> f64 {
    0.7
}

const fn default_gate_timeout_secs() -> u64 {
    20
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            timeout_secs: default_gate_timeout_secs(),
        }
    }
}

impl GateSettings {
    #[must_use]
    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            threshold: self.threshold,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// `[rebalance]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RebalanceSettings {
    /// Fractional gain that triggers take-profit (1.0 = +100%).
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: Decimal,
    /// Fractional loss that triggers stop-loss (-0.5 = -50%).
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,
    #[serde(default = "default_scheduled_window_days")]
    pub scheduled_window_days: u32,
    #[serde(default = "default_overflow_window_days")]
    pub overflow_window_days: u32,
}

fn default_take_profit_pct() -> Decimal {
    Decimal::ONE
}

fn default_stop_loss_pct() -> Decimal {
    Decimal::new(-5, 1)
}

const fn default_scheduled_window_days() -> u32 {
    14
}

const fn default_overflow_window_days() -> u32 {
    7
}

impl Default for RebalanceSettings {
    fn default() -> Self {
        Self {
            take_profit_pct: default_take_profit_pct(),
            stop_loss_pct: default_stop_loss_pct(),
            scheduled_window_days: default_scheduled_window_days(),
            overflow_window_days: default_overflow_window_days(),
        }
    }
}

impl RebalanceSettings {
    /// Engine config; the buy size comes from the portfolio section.
    #[must_use]
    pub fn rebalance_config(&self, position_size_usd: Decimal) -> RebalanceConfig {
        RebalanceConfig {
            rules: RuleConfig {
                take_profit_pct: self.take_profit_pct,
                stop_loss_pct: self.stop_loss_pct,
            },
            scheduled_window: chrono::Duration::days(i64::from(self.scheduled_window_days)),
            overflow_window: chrono::Duration::days(i64::from(self.overflow_window_days)),
            position_size_usd,
        }
    }
}

/// `[monitor]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

const fn default_interval_secs() -> u64 {
    3600
}

const fn default_batch_size() -> usize {
    30
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            batch_size: default_batch_size(),
        }
    }
}

impl MonitorSettings {
    #[must_use]
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            interval: Duration::from_secs(self.interval_secs),
            batch_size: self.batch_size,
        }
    }
}
