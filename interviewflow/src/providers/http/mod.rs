//! HTTP adapters for the supported providers.
//!
//! Each adapter maps its vendor's wire format onto [`CompletionRequest`] and
//! [`Completion`], and every failure onto an [`LlmError`] through
//! [`classify_failure`].
//!
//! [`CompletionRequest`]: crate::providers::CompletionRequest
//! [`Completion`]: crate::providers::Completion

mod anthropic;
mod gemini;
mod openai;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;
pub use openai::OpenAiCompatibleClient;

use crate::config::{ProviderId, ProviderSettings};
use crate::errors::LlmError;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use std::sync::OnceLock;

/// Longest error body carried into an error message.
const MAX_ERROR_BODY: usize = 500;

fn is_overload_message(body: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)overloaded|temporarily unavailable|at capacity|capacity exceeded").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(body))
}

/// Builds a reqwest client with JSON defaults and the provider timeout.
pub(crate) fn build_http_client(
    settings: &ProviderSettings,
    mut headers: HeaderMap,
) -> Result<reqwest::Client, LlmError> {
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    reqwest::Client::builder()
        .timeout(settings.timeout())
        .default_headers(headers)
        .build()
        .map_err(|e| LlmError::Config(format!("failed to create HTTP client: {e}")))
}

/// Classifies a non-success HTTP response.
///
/// 503 and 529 are transient, as is a 5xx whose body reports overload or
/// exhausted capacity. Everything else is a plain provider error carrying
/// the status.
pub(crate) fn classify_failure(provider: ProviderId, status: u16, body: &str) -> LlmError {
    let message = truncate(body);
    if matches!(status, 503 | 529) || (status >= 500 && is_overload_message(body)) {
        LlmError::overloaded(provider, message)
    } else {
        LlmError::provider(provider, Some(status), message)
    }
}

/// Maps a transport failure.
pub(crate) fn transport_error(provider: ProviderId, err: &reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout { provider }
    } else {
        LlmError::provider(provider, err.status().map(|s| s.as_u16()), err.to_string())
    }
}

/// Sends a JSON request and returns the body of a successful response.
pub(crate) async fn send_json(
    provider: ProviderId,
    request: reqwest::RequestBuilder,
) -> Result<String, LlmError> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(provider, &e))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(provider, &e))?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(classify_failure(provider, status.as_u16(), &body))
    }
}

/// Parses a successful response body.
pub(crate) fn parse_body<T: serde::de::DeserializeOwned>(
    provider: ProviderId,
    body: &str,
) -> Result<T, LlmError> {
    serde_json::from_str(body).map_err(|e| LlmError::MalformedResponse {
        provider,
        message: format!("unexpected response shape: {e}"),
    })
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overload_statuses() {
        assert!(classify_failure(ProviderId::Anthropic, 529, "").is_transient_overload());
        assert!(classify_failure(ProviderId::OpenAi, 503, "").is_transient_overload());
    }

    #[test]
    fn test_overload_body_markers() {
        let err = classify_failure(
            ProviderId::Anthropic,
            500,
            r#"{"type":"error","error":{"type":"overloaded_error"}}"#,
        );
        assert!(err.is_transient_overload());

        let err = classify_failure(ProviderId::Gemini, 500, "The model is at Capacity");
        assert!(err.is_transient_overload());
    }

    #[test]
    fn test_body_markers_ignored_on_client_errors() {
        let err = classify_failure(
            ProviderId::OpenAi,
            400,
            "max_tokens exceeds the model's context capacity; the model is at capacity for this prompt",
        );
        assert!(!err.is_transient_overload());
        assert!(matches!(err, LlmError::Provider { status: Some(400), .. }));

        let err = classify_failure(ProviderId::OpenAi, 500, "storage capacity check failed");
        assert!(!err.is_transient_overload());
    }

    #[test]
    fn test_other_statuses_are_provider_errors() {
        let err = classify_failure(ProviderId::OpenAi, 429, "slow down");
        assert!(matches!(
            err,
            LlmError::Provider {
                status: Some(429),
                ..
            }
        ));
        assert!(err.warrants_backoff());
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(2_000);
        let err = classify_failure(ProviderId::OpenAi, 400, &body);
        assert!(err.to_string().len() < 700);
    }
}
