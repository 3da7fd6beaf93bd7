//! # Semantic Oracle Client
//!
//! Thin blocking client for OpenAI-compatible `/chat/completions` endpoints.
//! Both the emotion-spec generator and the track scorer talk to the oracle
//! through [`ChatClient`]; neither trusts the model to return clean JSON, so
//! replies go through [`extract_json`] first.

use anyhow::{anyhow, bail, Context, Result};
use log::debug;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Connection to a chat-completion oracle.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client for the oracle")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a single user prompt and return the reply text.
    pub fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            temperature,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        debug!("Sending oracle request to {url} (model {}, temperature {temperature})", self.model);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .with_context(|| format!("Oracle request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("Oracle answered {status}: {}", body.trim());
        }

        let parsed: ChatResponse = response.json().context("Oracle reply is not a chat completion")?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| anyhow!("Oracle reply has no message content"))
    }

    /// [`complete`](Self::complete) followed by [`extract_json`].
    pub fn complete_json<T: DeserializeOwned>(&self, prompt: &str, temperature: f32) -> Result<T> {
        let text = self.complete(prompt, temperature)?;
        extract_json(&text)
    }
}

/// Deserialize the JSON object embedded in `text`, from the first `{` to the
/// last `}`. Models like to wrap their answer in prose or code fences.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    let start = text.find('{').ok_or_else(|| anyhow!("No JSON object in oracle reply"))?;
    let end = text.rfind('}').ok_or_else(|| anyhow!("Unterminated JSON object in oracle reply"))?;
    if end < start {
        bail!("Malformed JSON object in oracle reply");
    }

    serde_json::from_str(&text[start..=end]).context("Oracle reply JSON does not match the expected shape")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_extract_json_strips_fences_and_prose() {
        let reply = "Sure! Here it is:\n```json\n{\"a\": 1, \"b\": {\"c\": 2}}\n```\nEnjoy.";
        let value: Value = extract_json(reply).unwrap();
        assert_eq!(value["b"]["c"], 2);
    }

    #[test]
    fn test_extract_json_rejects_missing_object() {
        assert!(extract_json::<Value>("no json here").is_err());
        assert!(extract_json::<Value>("} backwards {").is_err());
        assert!(extract_json::<Value>("{ broken: ").is_err());
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = ChatClient::new("http://localhost:9999/v1/", DEFAULT_MODEL, "key").unwrap();
        assert_eq!(client.base_url, "http://localhost:9999/v1");
        assert_eq!(client.model(), "gpt-4o-mini");
    }
}
