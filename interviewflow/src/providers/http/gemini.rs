//! Gemini `generateContent` adapter with optional search grounding.

use super::{build_http_client, parse_body, send_json};
use crate::config::{ProviderId, ProviderSettings};
use crate::errors::LlmError;
use crate::providers::{Citation, Completion, CompletionRequest, GroundingMetadata, ModelClient};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

/// Client for `POST /v1beta/models/{model}:generateContent`.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    /// Creates a client.
    pub fn new(api_key: &str, settings: &ProviderSettings) -> Result<Self, LlmError> {
        Ok(Self {
            client: build_http_client(settings, HeaderMap::new())?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<serde_json::Value>,
    generation_config: serde_json::Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    grounding_metadata: Option<WireGrounding>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireGrounding {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
    #[serde(default)]
    web_search_queries: Vec<String>,
}

#[derive(Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebChunk>,
}

#[derive(Deserialize)]
struct WebChunk {
    uri: String,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

impl From<WireGrounding> for GroundingMetadata {
    fn from(wire: WireGrounding) -> Self {
        Self {
            citations: wire
                .grounding_chunks
                .into_iter()
                .filter_map(|c| c.web)
                .map(|w| Citation {
                    url: w.uri,
                    title: w.title,
                })
                .collect(),
            search_queries: wire.web_search_queries,
        }
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    fn provider(&self) -> ProviderId {
        ProviderId::Gemini
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let mut generation_config = json!({
            "temperature": request.temperature,
            "maxOutputTokens": request.max_output_tokens,
        });
        // Search grounding and JSON mime type cannot be combined.
        if request.json_mode && !request.grounding {
            generation_config["responseMimeType"] = json!("application/json");
        }
        let body = GenerateRequest {
            contents: vec![json!({ "role": "user", "parts": [{ "text": request.prompt }] })],
            system_instruction: request
                .system
                .as_ref()
                .map(|s| json!({ "parts": [{ "text": s }] })),
            generation_config,
            tools: if request.grounding {
                vec![json!({ "google_search": {} })]
            } else {
                Vec::new()
            },
        };
        debug!(model = %request.model, grounding = request.grounding, "Gemini request");
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, request.model
        );
        let raw = send_json(
            ProviderId::Gemini,
            self.client
                .post(url)
                .query(&[("key", self.api_key.as_str())])
                .json(&body),
        )
        .await?;
        let parsed: GenerateResponse = parse_body(ProviderId::Gemini, &raw)?;
        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::MalformedResponse {
                provider: ProviderId::Gemini,
                message: "response has no candidates".to_string(),
            })?;
        let content: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        let (input, output) = parsed.usage_metadata.map_or((0, 0), |u| {
            (u.prompt_token_count, u.candidates_token_count)
        });
        let mut completion = Completion::new(content, input, output);
        completion.grounding = candidate
            .grounding_metadata
            .map(GroundingMetadata::from)
            .filter(|g| !g.is_empty());
        Ok(completion)
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}
