//! Anthropic Messages API adapter.

use super::{build_http_client, parse_body, send_json};
use crate::config::{ProviderId, ProviderSettings};
use crate::errors::LlmError;
use crate::providers::{Completion, CompletionRequest, ModelClient};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

const API_VERSION: &str = "2023-06-01";

/// Client for `POST /v1/messages`.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    base_url: String,
}

impl AnthropicClient {
    /// Creates a client.
    pub fn new(api_key: &str, settings: &ProviderSettings) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|_| LlmError::Config("invalid Anthropic API key format".to_string()))?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        Ok(Self {
            client: build_http_client(settings, headers)?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
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
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[async_trait]
impl ModelClient for AnthropicClient {
    fn provider(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        // Anthropic has no JSON mode; the schema instructions live in the prompt.
        let body = MessagesRequest {
            model: &request.model,
            max_tokens: request.max_output_tokens,
            temperature: request.temperature.min(1.0),
            system: request.system.as_deref(),
            messages: [Message {
                role: "user",
                content: &request.prompt,
            }],
        };
        debug!(model = %request.model, "Anthropic request");
        let raw = send_json(
            ProviderId::Anthropic,
            self.client
                .post(format!("{}/v1/messages", self.base_url))
                .json(&body),
        )
        .await?;
        let parsed: MessagesResponse = parse_body(ProviderId::Anthropic, &raw)?;
        let content: String = parsed
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text)
            .collect();
        let usage = parsed.usage.unwrap_or(Usage {
            input_tokens: 0,
            output_tokens: 0,
        });
        Ok(Completion::new(content, usage.input_tokens, usage.output_tokens))
    }
}
