//! LLM provider clients.
//!
//! Implementations of the [`Llm`](crate::port::outbound::llm::Llm) trait for
//! Anthropic and OpenAI.

pub mod anthropic;
pub mod openai;

use std::time::Duration;

/// Model parameters shared by all providers.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// HTTP timeout per request; the confidence gate applies its own bound.
    pub request_timeout: Duration,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-6".to_string(),
            max_tokens: 512,
            temperature: 0.0,
            request_timeout: Duration::from_secs(30),
        }
    }
}
