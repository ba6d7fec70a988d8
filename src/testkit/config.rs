//! Canonical test configuration.

use crate::infrastructure::config::Config;
use crate::testkit::dex::{QUOTE_TOKEN, ROUTER};

/// Minimal valid configuration routed over the scripted chain, dry run off
/// and records kept in memory.
pub fn config() -> Config {
    let mut config = Config {
        database: String::new(),
        ..Config::default()
    };
    config.execution.rpc_url = "http://localhost:8545".into();
    config.execution.router_address = ROUTER.to_string();
    config.execution.quote_token = QUOTE_TOKEN.to_string();
    config.execution.poll_interval_ms = 1;
    config.execution.confirmation_timeout_secs = 1;
    config
}

pub const SAMPLE_TOML: &str = r#"
database = ""
dry_run = true

[logging]
level = "debug"
format = "json"

[portfolio]
global_cap = 3
position_size_usd = 50
initial_balance_usd = 1000

[[portfolio.agents]]
name = "alpha"
cap = 2

[intake]
min_token_age_days = 3
min_liquidity_usd = 100000
max_market_cap_usd = 50000000

[gate]
threshold = 0.8
timeout_secs = 5

[rebalance]
take_profit_pct = 1.5
stop_loss_pct = -0.4

[monitor]
interval_secs = 60

[execution]
rpc_url = "http://localhost:8545"
network = "base"
chain_id = 8453
router_address = "0x0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b"
quote_token = "0x0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a"
max_gas_price_gwei = 25
builder_code = "0x62633031"

[llm]
provider = "openai"

[llm.openai]
model = "gpt-4o-mini"
max_tokens = 256
"#;
