//! Chat Completions adapter, shared by OpenAI and DeepSeek.

use super::{build_http_client, parse_body, send_json};
use crate::config::{ProviderId, ProviderSettings};
use crate::errors::LlmError;
use crate::providers::{Completion, CompletionRequest, ModelClient};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Client for any OpenAI-compatible `POST /chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    provider: ProviderId,
    client: reqwest::Client,
    base_url: String,
}

impl OpenAiCompatibleClient {
    /// Creates a client for `provider`.
    pub fn new(provider: ProviderId, api_key: &str, settings: &ProviderSettings) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| LlmError::Config(format!("invalid {provider} API key format")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        Ok(Self {
            provider,
            client: build_http_client(settings, headers)?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
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

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[async_trait]
impl ModelClient for OpenAiCompatibleClient {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });
        let body = ChatRequest {
            model: &request.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
            response_format: request.json_mode.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };
        debug!(provider = %self.provider, model = %request.model, "Chat completion request");
        let raw = send_json(
            self.provider,
            self.client
                .post(format!("{}/chat/completions", self.base_url))
                .json(&body),
        )
        .await?;
        let parsed: ChatResponse = parse_body(self.provider, &raw)?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::MalformedResponse {
                provider: self.provider,
                message: "response has no choices".to_string(),
            })?;
        let (input, output) = parsed
            .usage
            .map_or((0, 0), |u| (u.prompt_tokens, u.completion_tokens));
        Ok(Completion::new(content, input, output))
    }
}
