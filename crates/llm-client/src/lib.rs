pub mod error;

pub use error::{LlmError, LlmResult};

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";
const REFERER: &str = "https://wavesens-trading.app";
const APP_TITLE: &str = "WaveSens";

/// Chat-completion client targeting an OpenRouter-compatible endpoint,
/// sharing a single connection pool across calls the way `MLClient`
/// shares one `reqwest::Client` across its service clients.
#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

impl LlmClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_base_url(api_key, model, "https://openrouter.ai/api/v1".to_string())
    }

    pub fn with_base_url(api_key: String, model: String, base_url: String) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert("HTTP-Referer", HeaderValue::from_static(REFERER));
        headers.insert("X-Title", HeaderValue::from_static(APP_TITLE));

        Self {
            client: reqwest::Client::builder()
                .pool_max_idle_per_host(8)
                .default_headers(headers)
                .no_proxy()
                .build()
                .expect("building http client"),
            base_url,
            api_key,
            model,
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        use anyhow::Context;
        let api_key = std::env::var("OPENROUTER_API_KEY").context("OPENROUTER_API_KEY not set")?;
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "anthropic/claude-3-haiku".to_string());
        Ok(Self::new(api_key, model))
    }

    /// Requests a single completion for `prompt`, bounding both the
    /// generation length and wall-clock time.
    pub async fn complete(&self, prompt: &str, max_tokens: u32, temperature: f32, timeout: Duration) -> LlmResult<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            max_tokens,
            temperature,
        };

        let response = self
            .client
            .post(format!("{}{CHAT_COMPLETIONS_PATH}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { LlmError::Timeout(timeout) } else { LlmError::RequestFailed(e) })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ProviderStatus(format!("{status}: {body}")));
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|s| !s.trim().is_empty())
            .ok_or(LlmError::EmptyCompletion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_targets_openrouter_by_default() {
        let client = LlmClient::new("key".to_string(), "model".to_string());
        assert_eq!(client.base_url, "https://openrouter.ai/api/v1");
    }
}
