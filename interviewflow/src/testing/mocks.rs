//! Scriptable model client for tests.

use crate::config::ProviderId;
use crate::errors::LlmError;
use crate::providers::{Completion, CompletionRequest, ModelClient};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Responder = Arc<dyn Fn(&CompletionRequest) -> MockOutcome + Send + Sync>;
type LatencyFn = Arc<dyn Fn(&CompletionRequest) -> Duration + Send + Sync>;

/// What a mock call returns.
#[derive(Debug, Clone, PartialEq)]
pub enum MockOutcome {
    /// A successful completion.
    Content(Completion),
    /// A transient overload.
    Overloaded,
    /// A non-overload provider failure (HTTP 500).
    ProviderFailure(String),
    /// A client-side timeout.
    Timeout,
}

impl MockOutcome {
    /// Successful completion with nominal token counts.
    #[must_use]
    pub fn content(content: impl Into<String>) -> Self {
        Self::Content(Completion::new(content, 10, 20))
    }

    /// Successful completion with explicit token counts.
    #[must_use]
    pub fn content_with_tokens(content: impl Into<String>, input: u32, output: u32) -> Self {
        Self::Content(Completion::new(content, input, output))
    }

    /// Provider failure.
    #[must_use]
    pub fn provider_failure(message: impl Into<String>) -> Self {
        Self::ProviderFailure(message.into())
    }

    fn into_result(self, provider: ProviderId) -> Result<Completion, LlmError> {
        match self {
            Self::Content(completion) => Ok(completion),
            Self::Overloaded => Err(LlmError::overloaded(provider, "overloaded")),
            Self::ProviderFailure(message) => Err(LlmError::provider(provider, Some(500), message)),
            Self::Timeout => Err(LlmError::Timeout { provider }),
        }
    }
}

#[derive(Debug, Default)]
struct CallLog {
    queue: Mutex<VecDeque<MockOutcome>>,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a CallLog);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A [`ModelClient`] that replays scripted outcomes and records requests.
///
/// Outcomes are chosen in order: queued outcomes, then the responder, then
/// the default. Clones share the call log.
#[derive(Clone)]
pub struct MockModelClient {
    provider: ProviderId,
    default: Option<MockOutcome>,
    responder: Option<Responder>,
    latency: Option<LatencyFn>,
    log: Arc<CallLog>,
}

impl MockModelClient {
    /// Creates a mock that fails every call until scripted.
    #[must_use]
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            default: None,
            responder: None,
            latency: None,
            log: Arc::new(CallLog::default()),
        }
    }

    /// Outcome used when nothing else applies.
    #[must_use]
    pub fn with_default(mut self, outcome: MockOutcome) -> Self {
        self.default = Some(outcome);
        self
    }

    /// Queues a one-shot outcome.
    #[must_use]
    pub fn with_outcome(self, outcome: MockOutcome) -> Self {
        self.log.queue.lock().push_back(outcome);
        self
    }

    /// Computes outcomes from the request.
    #[must_use]
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> MockOutcome + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Fixed latency per call.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.with_latency_fn(move |_| latency)
    }

    /// Latency computed from the request.
    #[must_use]
    pub fn with_latency_fn<F>(mut self, latency: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Duration + Send + Sync + 'static,
    {
        self.latency = Some(Arc::new(latency));
        self
    }

    /// Number of calls received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.log.calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping calls observed.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.log.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Every request received, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.log.requests.lock().clone()
    }

    /// Every prompt received, in arrival order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.log
            .requests
            .lock()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }

    fn next_outcome(&self, request: &CompletionRequest) -> MockOutcome {
        if let Some(outcome) = self.log.queue.lock().pop_front() {
            return outcome;
        }
        if let Some(responder) = &self.responder {
            return responder(request);
        }
        self.default
            .clone()
            .unwrap_or_else(|| MockOutcome::provider_failure("no scripted response"))
    }
}

impl std::fmt::Debug for MockModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockModelClient")
            .field("provider", &self.provider)
            .field("calls", &self.call_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        self.log.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.log.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.log);
        self.log.requests.lock().push(request.clone());

        if let Some(latency) = &self.latency {
            let delay = latency(request);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        self.next_outcome(request).into_result(self.provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> CompletionRequest {
        CompletionRequest {
            model: "m".to_string(),
            system: None,
            prompt: prompt.to_string(),
            temperature: 0.0,
            max_output_tokens: 10,
            json_mode: false,
            grounding: false,
        }
    }

    #[tokio::test]
    async fn test_queue_then_default() {
        let client = MockModelClient::new(ProviderId::OpenAi)
            .with_outcome(MockOutcome::Overloaded)
            .with_default(MockOutcome::content("fine"));

        assert!(client.complete(&request("a")).await.unwrap_err().is_transient_overload());
        assert_eq!(client.complete(&request("b")).await.unwrap().content, "fine");
        assert_eq!(client.call_count(), 2);
        assert_eq!(client.prompts(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_unscripted_calls_fail() {
        let client = MockModelClient::new(ProviderId::Gemini);
        let err = client.complete(&request("a")).await.unwrap_err();
        assert!(matches!(err, LlmError::Provider { status: Some(500), .. }));
    }

    #[tokio::test]
    async fn test_clones_share_the_log() {
        let client = MockModelClient::new(ProviderId::Gemini).with_responder(|r| MockOutcome::content(r.prompt.to_uppercase()));
        let shared = client.clone();
        assert_eq!(shared.complete(&request("hi")).await.unwrap().content, "HI");
        assert_eq!(client.call_count(), 1);
        assert_eq!(
            MockOutcome::Timeout.into_result(ProviderId::Gemini).unwrap_err().kind(),
            "timeout"
        );
    }
}
