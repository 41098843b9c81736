use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use courier_core::types::{PromptMessage, PromptRole};

use crate::provider::{CompletionProvider, ProviderError};

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: Option<String>, model: String, max_tokens: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            model,
            max_tokens,
        }
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, ProviderError> {
        let body = build_request_body(&self.model, self.max_tokens, messages);
        let url = format!("{}/v1/messages", self.base_url);

        debug!(model = %self.model, "sending request to Anthropic");

        let resp = self
            .client
            .post(&url)
            .header("anthropic-version", API_VERSION)
            .header("x-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5000);
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry,
            });
        }

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Anthropic API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let text = extract_text(&api_resp);
        if text.trim().is_empty() {
            return Err(ProviderError::Empty);
        }
        Ok(text)
    }
}

/// System entries are concatenated into the request's `system` field; the
/// rest become the user/assistant message array.
fn build_request_body(
    model: &str,
    max_tokens: u32,
    messages: &[PromptMessage],
) -> serde_json::Value {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == PromptRole::System)
        .map(|m| m.content.as_str())
        .collect();

    let turns: Vec<serde_json::Value> = messages
        .iter()
        .filter(|m| m.role != PromptRole::System)
        .map(|m| {
            let role = match m.role {
                PromptRole::Assistant => "assistant",
                _ => "user",
            };
            serde_json::json!({ "role": role, "content": m.content })
        })
        .collect();

    serde_json::json!({
        "model": model,
        "max_tokens": max_tokens,
        "system": system.join("\n\n"),
        "messages": turns,
    })
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

fn extract_text(resp: &ApiResponse) -> String {
    resp.content
        .iter()
        .filter(|b| b.kind == "text")
        .filter_map(|b| b.text.as_deref())
        .collect::<Vec<_>>()
        .join("\n")
}
