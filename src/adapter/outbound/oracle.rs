//! LLM-backed scoring oracle.
//!
//! Renders the scoring bundle into a prompt, asks the model for a JSON
//! verdict and parses it. Range checking is left to the confidence gate.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::{Error, Result};
use crate::port::outbound::llm::{Completion, Llm};
use crate::port::{ScoreResponse, ScoringOracle, ScoringRequest};

const SYSTEM_PROMPT: &str = "You evaluate short-horizon crypto token trades suggested by \
social-media trading accounts. Weigh the account's track record against the token's live \
market metrics and return only a JSON object of the form \
{\"score\": <number between 0 and 1>, \"rationale\": \"<one sentence>\"}. \
A score of 1 means a highly confident buy; 0 means do not buy.";

/// [`ScoringOracle`] over any [`Llm`] provider.
pub struct LlmOracle {
    llm: Arc<dyn Llm>,
}

impl LlmOracle {
    #[must_use]
    pub fn new(llm: Arc<dyn Llm>) -> Self {
        Self { llm }
    }

    fn build_prompt(request: &ScoringRequest) -> String {
        let signal = &request.signal;
        let perf = &request.performance;
        let metrics = &request.metrics;

        let mut prompt = String::new();
        let _ = writeln!(prompt, "## Signal");
        let _ = writeln!(prompt, "Agent: {}", signal.agent);
        let _ = writeln!(prompt, "Ticker: {}", signal.ticker);
        let _ = writeln!(prompt, "Contract: {} on {}", signal.contract, signal.network);
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "## Agent track record");
        let _ = writeln!(prompt, "Open positions: {}", perf.open_positions);
        let _ = writeln!(prompt, "Closed positions: {}", perf.closed_positions);
        if perf.closed_positions == 0 {
            let _ = writeln!(prompt, "Win rate: no closed trades");
        } else {
            let _ = writeln!(prompt, "Win rate: {:.1}%", perf.win_rate() * 100.0);
        }
        let _ = writeln!(prompt, "Realized PnL (USD): {}", perf.realized_pnl.round_dp(2));
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "## Token metrics");
        let _ = writeln!(prompt, "Price (USD): {}", metrics.price_usd);
        let _ = writeln!(prompt, "Liquidity (USD): {}", metrics.liquidity_usd.round_dp(0));
        let _ = writeln!(prompt, "24h volume (USD): {}", metrics.volume_24h_usd.round_dp(0));
        if let Some(change) = metrics.price_change_24h {
            let _ = writeln!(prompt, "24h price change: {}%", (change * Decimal::ONE_HUNDRED).round_dp(2));
        }
        if let Some(cap) = metrics.market_cap_usd {
            let _ = writeln!(prompt, "Market cap (USD): {}", cap.round_dp(0));
        }
        if let Some(mentions) = request.mention_volume {
            let _ = writeln!(prompt, "Recent mentions: {mentions}");
        }
        prompt
    }
}

#[async_trait]
impl ScoringOracle for LlmOracle {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn score(&self, request: &ScoringRequest) -> Result<ScoreResponse> {
        let completion = Completion::new(SYSTEM_PROMPT, Self::build_prompt(request));
        let text = self.llm.complete(&completion).await?;
        debug!(provider = self.llm.name(), ticker = %request.signal.ticker, "Scoring completion received");
        parse_score(&text)
    }
}

/// Parse the model's verdict, tolerating code fences and surrounding prose.
fn parse_score(text: &str) -> Result<ScoreResponse> {
    let json = extract_json(text)?;
    serde_json::from_str(json).map_err(|e| Error::Parse(format!("invalid score JSON: {e}")))
}

fn extract_json(text: &str) -> Result<&str> {
    if let Some(start) = text.find("```json") {
        let start = start + "```json".len();
        let end = text[start..].find("```").map_or(text.len(), |i| start + i);
        return Ok(text[start..end].trim());
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => Ok(&text[start..=end]),
        _ => Err(Error::Parse("no JSON object in completion".into())),
    }
}
