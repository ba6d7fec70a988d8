//! LLM provider configuration.
//!
//! Selects the model behind the scoring oracle. API keys are read from
//! `ANTHROPIC_API_KEY` or `OPENAI_API_KEY` at startup, never from the file.

use std::time::Duration;

use serde::Deserialize;

use crate::adapter::outbound::llm::ModelSettings;

/// `[llm]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Defaults to Anthropic.
    #[serde(default)]
    pub provider: LlmProvider,

    /// Used when `provider` is `anthropic`.
    #[serde(default = "ProviderConfig::anthropic")]
    pub anthropic: ProviderConfig,

    /// Used when `provider` is `openai`.
    #[serde(default = "ProviderConfig::openai")]
    pub openai: ProviderConfig,

    /// HTTP timeout per completion request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// LLM provider selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Anthropic,
    OpenAi,
}

/// Per-provider model settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub model: String,

    /// Sampling temperature. Defaults to 0 for repeatable scores.
    #[serde(default)]
    pub temperature: f64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Override for the provider's API host.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl ProviderConfig {
    fn anthropic() -> Self {
        Self::with_model("claude-sonnet-4-6")
    }

    fn openai() -> Self {
        Self::with_model("gpt-4o-mini")
    }

    fn with_model(model: &str) -> Self {
        Self {
            model: model.into(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            base_url: None,
        }
    }
}

const fn default_max_tokens() -> u32 {
    512
}

const fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            anthropic: ProviderConfig::anthropic(),
            openai: ProviderConfig::openai(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl LlmConfig {
    /// Settings for the active provider.
    #[must_use]
    pub fn active(&self) -> &ProviderConfig {
        match self.provider {
            LlmProvider::Anthropic => &self.anthropic,
            LlmProvider::OpenAi => &self.openai,
        }
    }

    /// Model settings for the active provider.
    #[must_use]
    pub fn model_settings(&self) -> ModelSettings {
        let active = self.active();
        ModelSettings {
            model: active.model.clone(),
            max_tokens: active.max_tokens,
            temperature: active.temperature,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}
