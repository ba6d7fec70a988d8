//! Anthropic Messages API client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::ModelSettings;
use crate::error::{ConfigError, Error, Result};
use crate::port::outbound::llm::{Completion, Llm};

/// Public API root.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// API version header value.
const API_VERSION: &str = "2023-06-01";

/// Anthropic client implementing [`Llm`].
#[derive(Debug)]
pub struct Anthropic {
    client: Client,
    api_key: String,
    endpoint: String,
    settings: ModelSettings,
}

impl Anthropic {
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
            endpoint: format!("{}/v1/messages", base_url.trim_end_matches('/')),
            settings,
        })
    }

    /// Create a client from the `ANTHROPIC_API_KEY` environment variable.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment variable is not set.
    pub fn from_env(settings: ModelSettings) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| ConfigError::MissingField {
            field: "ANTHROPIC_API_KEY",
        })?;
        Self::new(api_key, DEFAULT_BASE_URL, settings)
    }

    fn request<'a>(&'a self, completion: &'a Completion) -> Request<'a> {
        Request {
            model: &self.settings.model,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            system: (!completion.system.is_empty()).then_some(completion.system.as_str()),
            messages: [Message {
                role: "user",
                content: &completion.prompt,
            }],
        }
    }
}

#[derive(Serialize)]
struct Request<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct Response {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl Response {
    fn text(self) -> String {
        self.content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect()
    }
}

#[async_trait]
impl Llm for Anthropic {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn complete(&self, completion: &Completion) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.request(completion))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::Connection(e.to_string()))?
            .json::<Response>()
            .await?;
        Ok(response.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_is_top_level() {
        let client = Anthropic::new("key", DEFAULT_BASE_URL, ModelSettings::default()).unwrap();
        let completion = Completion::new("You score trades.", "Score this.");
        let json = serde_json::to_value(client.request(&completion)).unwrap();
        assert_eq!(json["system"], "You score trades.");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "Score this.");
    }

    #[test]
    fn empty_system_prompt_is_omitted() {
        let client = Anthropic::new("key", DEFAULT_BASE_URL, ModelSettings::default()).unwrap();
        let completion = Completion::new("", "Score this.");
        let json = serde_json::to_value(client.request(&completion)).unwrap();
        assert!(json.get("system").is_none());
    }

    #[test]
    fn joins_text_blocks_only() {
        let json = r#"{"content": [
            {"type": "thinking", "thinking": "..."},
            {"type": "text", "text": "{\"score\": "},
            {"type": "text", "text": "0.8}"}
        ]}"#;
        let response: Response = serde_json::from_str(json).unwrap();
        assert_eq!(response.text(), r#"{"score": 0.8}"#);
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let client = Anthropic::new("key", "http://localhost:9000/", ModelSettings::default()).unwrap();
        assert_eq!(client.endpoint, "http://localhost:9000/v1/messages");
    }
}
