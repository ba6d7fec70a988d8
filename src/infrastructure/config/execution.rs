//! Execution configuration: slippage, gas, confirmation and the route.

use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::{Address, Bytes};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::execution::{gwei_to_wei, ExecutionConfig, GasPolicy};
use crate::error::{ConfigError, Result};

/// `[execution]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionSettings {
    #[serde(default = "default_slippage")]
    pub default_slippage: Decimal,
    #[serde(default = "default_slippage_floor")]
    pub slippage_floor: Decimal,
    #[serde(default = "default_gas_margin")]
    pub gas_margin: Decimal,
    #[serde(default = "default_gas_margin")]
    pub retry_gas_bump: Decimal,
    /// Gas-spike ceiling; unset disables the check.
    #[serde(default)]
    pub max_gas_price_gwei: Option<Decimal>,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Hex suffix appended to swap calldata.
    #[serde(default)]
    pub builder_code: String,

    /// Network name the route serves, as reported by market data.
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default)]
    pub rpc_url: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    #[serde(default)]
    pub router_address: String,
    /// USD-pegged token trades are priced against.
    #[serde(default)]
    pub quote_token: String,
    /// Tokens that need the fee-on-transfer swap variant.
    #[serde(default)]
    pub fee_on_transfer_tokens: Vec<String>,
}

fn default_slippage() -> Decimal {
    Decimal::new(5, 2)
}

fn default_slippage_floor() -> Decimal {
    Decimal::new(2, 2)
}

fn default_gas_margin() -> Decimal {
    Decimal::new(10, 2)
}

const fn default_deadline_secs() -> u64 {
    1200
}

const fn default_confirmation_timeout_secs() -> u64 {
    120
}

const fn default_poll_interval_ms() -> u64 {
    2000
}

const fn default_max_attempts() -> u32 {
    2
}

fn default_network() -> String {
    "base".into()
}

const fn default_chain_id() -> u64 {
    8453
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            default_slippage: default_slippage(),
            slippage_floor: default_slippage_floor(),
            gas_margin: default_gas_margin(),
            retry_gas_bump: default_gas_margin(),
            max_gas_price_gwei: None,
            deadline_secs: default_deadline_secs(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
            builder_code: String::new(),
            network: default_network(),
            rpc_url: String::new(),
            chain_id: default_chain_id(),
            router_address: String::new(),
            quote_token: String::new(),
            fee_on_transfer_tokens: Vec::new(),
        }
    }
}

fn address(field: &'static str, value: &str) -> Result<Address> {
    Address::from_str(value.trim()).map_err(|e| {
        ConfigError::InvalidValue {
            field,
            reason: e.to_string(),
        }
        .into()
    })
}

impl ExecutionSettings {
    /// Router settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the builder code is not valid hex.
    pub fn execution_config(&self, dry_run: bool) -> Result<ExecutionConfig> {
        let builder_code = if self.builder_code.trim().is_empty() {
            Bytes::new()
        } else {
            Bytes::from_str(self.builder_code.trim()).map_err(|e| ConfigError::InvalidValue {
                field: "execution.builder_code",
                reason: e.to_string(),
            })?
        };
        Ok(ExecutionConfig {
            default_slippage: self.default_slippage,
            slippage_floor: self.slippage_floor,
            gas: GasPolicy {
                margin: self.gas_margin,
                retry_bump: self.retry_gas_bump,
                max_price_wei: self.max_gas_price_gwei.and_then(gwei_to_wei),
            },
            deadline: Duration::from_secs(self.deadline_secs),
            confirmation_timeout: Duration::from_secs(self.confirmation_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_attempts,
            builder_code,
            dry_run,
        })
    }

    /// Router contract address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is missing or malformed.
    pub fn router(&self) -> Result<Address> {
        address("execution.router_address", &self.router_address)
    }

    /// Quote token address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is missing or malformed.
    pub fn quote(&self) -> Result<Address> {
        address("execution.quote_token", &self.quote_token)
    }

    /// Fee-on-transfer token addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if any address is malformed.
    pub fn fee_on_transfer(&self) -> Result<Vec<Address>> {
        self.fee_on_transfer_tokens
            .iter()
            .map(|t| address("execution.fee_on_transfer_tokens", t))
            .collect()
    }
}
