/// Claude Messages API client (non-streaming)
use super::ReplyGenerator;
use crate::{
    config::AnthropicConfig,
    error::{ChaseError, ChaseResult},
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// First text block of a response, if any
fn first_text(response: MessagesResponse) -> Option<String> {
    response
        .content
        .into_iter()
        .find(|b| b.kind == "text")
        .and_then(|b| b.text)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Claude client used for assistant replies
pub struct ClaudeClient {
    http: reqwest::Client,
    config: AnthropicConfig,
}

impl ClaudeClient {
    pub fn new(config: AnthropicConfig) -> ChaseResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self { http, config })
    }
}

#[async_trait]
impl ReplyGenerator for ClaudeClient {
    async fn generate(&self, system: &str, conversation: &str) -> ChaseResult<Option<String>> {
        if self.config.api_key.is_empty() {
            return Err(ChaseError::vendor("Claude", "API key not configured"));
        }

        let body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "system": system,
            "messages": [{ "role": "user", "content": conversation }]
        });

        let response = self
            .http
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ApiErrorBody>()
                .await
                .map(|b| b.error.message)
                .unwrap_or_else(|_| status.to_string());
            return Err(ChaseError::vendor("Claude", message));
        }

        let parsed: MessagesResponse = response.json().await?;
        Ok(first_text(parsed))
    }
}
