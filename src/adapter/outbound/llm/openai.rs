//! OpenAI Chat Completions client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::ModelSettings;
use crate::error::{ConfigError, Error, Result};
use crate::port::outbound::llm::{Completion, Llm};

/// Public API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// OpenAI client implementing [`Llm`].
#[derive(Debug)]
pub struct OpenAi {
    client: Client,
    api_key: String,
    endpoint: String,
    settings: ModelSettings,
}

impl OpenAi {
    /// Create a client against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>, base_url: &str, settings: ModelSettings) -> Result<Self> {
        let client = Client::builder().timeout(settings.request_timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')),
            settings,
        })
    }

    /// Create a client from the `OPENAI_API_KEY` environment variable.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment variable is not set.
    pub fn from_env(settings: ModelSettings) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| ConfigError::MissingField {
            field: "OPENAI_API_KEY",
        })?;
        Self::new(api_key, DEFAULT_BASE_URL, settings)
    }

    fn request<'a>(&'a self, completion: &'a Completion) -> Request<'a> {
        let mut messages = Vec::with_capacity(2);
        if !completion.system.is_empty() {
            messages.push(Message {
                role: "system",
                content: &completion.system,
            });
        }
        messages.push(Message {
            role: "user",
            content: &completion.prompt,
        });
        Request {
            model: &self.settings.model,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
            messages,
        }
    }
}

#[derive(Serialize)]
struct Request<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    response_format: ResponseFormat,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct Response {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl Llm for OpenAi {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, completion: &Completion) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request(completion))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::Connection(e.to_string()))?
            .json::<Response>()
            .await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::Parse("completion returned no content".into()))
    }
}
