use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use poflow_core::config::AppConfig;
use poflow_core::error::{PoflowError, Result};
use poflow_core::semantic::SemanticService;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const MAX_TOKENS: u32 = 4096;

/// [`SemanticService`] backed by the Anthropic Messages API.
pub struct AnthropicService {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

// ── Anthropic Messages API request/response types ──────────────────────────

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

// ── Implementation ─────────────────────────────────────────────────────────

impl AnthropicService {
    pub fn new(config: &AppConfig) -> Result<Self> {
        // Per-request ceiling; the retry policy bounds the whole exchange.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.semantic_timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            api_key: config.anthropic_api_key.clone(),
            model: config.semantic_model.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn first_text(response: AnthropicResponse) -> Result<String> {
        tracing::debug!(stop_reason = ?response.stop_reason, "Received semantic response");
        response
            .content
            .into_iter()
            .find_map(|block| (block.block_type == "text").then_some(block.text).flatten())
            .ok_or_else(|| {
                PoflowError::MalformedSemanticResponse("No text content block in API response".into())
            })
    }
}

#[async_trait]
impl SemanticService for AnthropicService {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if !self.is_configured() {
            return Err(PoflowError::SemanticUnavailable("ANTHROPIC_API_KEY is not set".into()));
        }

        let request = AnthropicRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: vec![Message { role: "user", content: prompt }],
        };

        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "Sending request to Anthropic API");

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| PoflowError::SemanticUnavailable(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(PoflowError::SemanticUnavailable(format!(
                "Anthropic API returned status {status}: {body}"
            )));
        }

        let api_response: AnthropicResponse = response.json().await.map_err(|e| {
            PoflowError::MalformedSemanticResponse(format!("Failed to parse API response: {e}"))
        })?;

        Self::first_text(api_response)
    }
}
