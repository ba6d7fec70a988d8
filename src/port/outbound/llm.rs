//! LLM completion port backing the LLM scoring oracle.

use async_trait::async_trait;

use crate::error::Result;

/// One single-turn completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Instructions that frame the task.
    pub system: String,
    /// The user turn.
    pub prompt: String,
}

impl Completion {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
        }
    }
}

/// Client for large language model text completion.
///
/// Implementations wrap a specific provider and handle authentication and
/// response parsing.
#[async_trait]
pub trait Llm: Send + Sync {
    /// Return the provider name for logging.
    fn name(&self) -> &'static str;

    /// Send a completion request and return the generated text.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails or the response is invalid.
    async fn complete(&self, completion: &Completion) -> Result<String>;
}
