//! Ordered fallback across providers.

use super::{GenerationOptions, ResponseSchema, StructuredInvoker, StructuredResponse};
use crate::config::{ProviderId, TaskName};
use crate::errors::LlmError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Tries `attempt` against each provider in `order` until one succeeds.
///
/// Overload and local rejections move on immediately. Any other failure
/// waits `backoff` first, unless it was the last candidate.
pub(crate) async fn try_in_order<T, F, Fut>(
    task: TaskName,
    primary: ProviderId,
    order: &[ProviderId],
    backoff: Duration,
    mut attempt: F,
) -> Result<T, LlmError>
where
    F: FnMut(ProviderId) -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempted = Vec::with_capacity(order.len());
    let mut last_error = None;

    for (index, &provider) in order.iter().enumerate() {
        attempted.push(provider);
        match attempt(provider).await {
            Ok(value) => {
                if index > 0 {
                    info!(task = %task, provider = %provider, attempts = index + 1, "Served by fallback provider");
                }
                return Ok(value);
            }
            Err(e) => {
                let has_next = index + 1 < order.len();
                let wait = has_next && e.warrants_backoff();
                warn!(
                    task = %task,
                    provider = %provider,
                    error = %e,
                    kind = e.kind(),
                    backoff_ms = if wait { backoff.as_millis() } else { 0 },
                    "Provider attempt failed"
                );
                last_error = Some(e);
                if wait {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    let last_error = last_error.unwrap_or(LlmError::ProviderUnavailable { provider: primary });
    Err(LlmError::exhausted(task, attempted, last_error))
}

/// Drives [`StructuredInvoker`] across a task's provider order.
#[derive(Debug, Clone)]
pub struct FallbackOrchestrator {
    invoker: Arc<StructuredInvoker>,
    backoff: Duration,
}

impl FallbackOrchestrator {
    /// Creates an orchestrator using the configured backoff.
    #[must_use]
    pub fn new(invoker: Arc<StructuredInvoker>) -> Self {
        let backoff = invoker.registry().config().fallback_backoff();
        Self { invoker, backoff }
    }

    /// Overrides the backoff.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Providers that would be tried for `task`, in order.
    #[must_use]
    pub fn provider_order(&self, task: TaskName) -> Vec<ProviderId> {
        self.invoker.registry().provider_order(task)
    }

    /// Invokes `task` with fallback.
    ///
    /// A cache hit returns immediately. With a forced provider, or when the
    /// task is pinned, the fallback order is bypassed and that provider's
    /// error is returned unchanged.
    pub async fn invoke<S>(
        &self,
        task: TaskName,
        schema: &S,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<StructuredResponse<S::Output>, LlmError>
    where
        S: ResponseSchema + ?Sized,
    {
        if let Some(hit) = self.invoker.cached(schema, task, prompt, options) {
            return Ok(hit);
        }
        let invoker = &self.invoker;
        let forced = options
            .forced_provider
            .or_else(|| invoker.registry().pinned_provider(task));
        if let Some(provider) = forced {
            return invoker.invoke(provider, schema, task, prompt, options).await;
        }

        let primary = invoker
            .registry()
            .config()
            .task(task)
            .map_err(|e| LlmError::Config(e.to_string()))?
            .provider;
        let order = self.provider_order(task);
        try_in_order(task, primary, &order, self.backoff, move |provider| {
            invoker.invoke(provider, schema, task, prompt, options)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskConfig;
    use crate::llm::{JsonSchema, PlainText};
    use crate::testing::{fixtures, MockModelClient, MockOutcome, TestScore};
    use pretty_assertions::assert_eq;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_overload_falls_back_without_delay() {
        // StructureDesign: Anthropic first, then OpenAI.
        let anthropic = MockModelClient::new(ProviderId::Anthropic).with_default(MockOutcome::Overloaded);
        let openai = MockModelClient::new(ProviderId::OpenAi)
            .with_default(MockOutcome::content(r#"{"score": 90}"#));
        let stack = fixtures::llm_stack(vec![anthropic.clone(), openai.clone()]);

        let started = Instant::now();
        let response = stack
            .fallback
            .invoke(
                TaskName::StructureDesign,
                &JsonSchema::<TestScore>::new(),
                "design",
                &GenerationOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(response.generation.provider, ProviderId::OpenAi);
        assert_eq!(response.data.score, 90.0);
        assert_eq!(anthropic.call_count(), 1);
        assert_eq!(openai.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_overloaded_never_sleeps() {
        let clients = [ProviderId::Anthropic, ProviderId::OpenAi, ProviderId::Gemini]
            .into_iter()
            .map(|p| MockModelClient::new(p).with_default(MockOutcome::Overloaded))
            .collect();
        let stack = fixtures::llm_stack(clients);

        let started = Instant::now();
        let err = stack
            .fallback
            .invoke(TaskName::StructureDesign, &PlainText, "p", &GenerationOptions::default())
            .await
            .unwrap_err();

        assert_eq!(started.elapsed(), Duration::ZERO);
        match err {
            LlmError::AllProvidersExhausted {
                attempted,
                last_error,
                ..
            } => {
                assert_eq!(
                    attempted,
                    vec![ProviderId::Anthropic, ProviderId::OpenAi, ProviderId::Gemini]
                );
                assert!(last_error.is_transient_overload());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_failures_back_off_between_providers() {
        let anthropic = MockModelClient::new(ProviderId::Anthropic)
            .with_default(MockOutcome::provider_failure("internal error"));
        let openai = MockModelClient::new(ProviderId::OpenAi)
            .with_default(MockOutcome::provider_failure("internal error"));
        let stack = fixtures::llm_stack(vec![anthropic, openai]);
        let backoff = stack.config.fallback_backoff();

        let started = Instant::now();
        let err = stack
            .fallback
            .invoke(TaskName::StructureDesign, &PlainText, "p", &GenerationOptions::default())
            .await
            .unwrap_err();

        // One wait between the two providers, none after the last.
        assert_eq!(started.elapsed(), backoff);
        assert_eq!(err.kind(), "all_providers_exhausted");
    }

    #[tokio::test(start_paused = true)]
    async fn test_schema_failure_falls_back() {
        let anthropic = MockModelClient::new(ProviderId::Anthropic)
            .with_default(MockOutcome::content(r#"{"score": "high"}"#));
        let openai = MockModelClient::new(ProviderId::OpenAi)
            .with_default(MockOutcome::content(r#"{"score": 70}"#));
        let stack = fixtures::llm_stack(vec![anthropic, openai]);

        let response = stack
            .fallback
            .invoke(
                TaskName::StructureDesign,
                &JsonSchema::<TestScore>::new(),
                "p",
                &GenerationOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(response.generation.provider, ProviderId::OpenAi);
    }

    #[tokio::test]
    async fn test_no_available_providers() {
        let stack = fixtures::llm_stack(Vec::new());
        let err = stack
            .fallback
            .invoke(TaskName::StructureDesign, &PlainText, "p", &GenerationOptions::default())
            .await
            .unwrap_err();
        match err {
            LlmError::AllProvidersExhausted {
                attempted,
                last_error,
                ..
            } => {
                assert!(attempted.is_empty());
                assert!(matches!(
                    *last_error,
                    LlmError::ProviderUnavailable {
                        provider: ProviderId::Anthropic
                    }
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_forced_provider_does_not_fall_back() {
        let anthropic = MockModelClient::new(ProviderId::Anthropic)
            .with_default(MockOutcome::Overloaded);
        let openai = MockModelClient::new(ProviderId::OpenAi).with_default(MockOutcome::content("ok"));
        let stack = fixtures::llm_stack(vec![anthropic, openai.clone()]);

        let options = GenerationOptions::default().with_forced_provider(ProviderId::Anthropic);
        let err = stack
            .fallback
            .invoke(TaskName::StructureDesign, &PlainText, "p", &options)
            .await
            .unwrap_err();
        assert!(err.is_transient_overload());
        assert_eq!(openai.call_count(), 0);
    }

    #[tokio::test]
    async fn test_pinned_task_does_not_fall_back() {
        let config = fixtures::test_config().with_task(
            TaskName::StructureDesign,
            TaskConfig::new(ProviderId::Anthropic, "claude-sonnet-4-20250514", 0.4, 4_000)
                .with_fallbacks([ProviderId::OpenAi])
                .pinned(),
        );
        let anthropic = MockModelClient::new(ProviderId::Anthropic)
            .with_default(MockOutcome::Overloaded);
        let openai = MockModelClient::new(ProviderId::OpenAi).with_default(MockOutcome::content("ok"));
        let stack = fixtures::llm_stack_with(vec![anthropic.clone(), openai.clone()], config);

        let err = stack
            .fallback
            .invoke(TaskName::StructureDesign, &PlainText, "p", &GenerationOptions::default())
            .await
            .unwrap_err();

        assert!(err.is_transient_overload(), "{err:?}");
        assert_eq!(err.provider_id(), Some(ProviderId::Anthropic));
        assert_eq!(anthropic.call_count(), 1);
        assert_eq!(openai.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_providers() {
        let openai = MockModelClient::new(ProviderId::OpenAi).with_default(MockOutcome::content("once"));
        let stack = fixtures::llm_stack(vec![openai.clone()]);
        let options = GenerationOptions::default();

        let first = stack
            .fallback
            .invoke(TaskName::JobParsing, &PlainText, "p", &options)
            .await
            .unwrap();
        let second = stack
            .fallback
            .invoke(TaskName::JobParsing, &PlainText, "p", &options)
            .await
            .unwrap();

        assert!(!first.generation.cached);
        assert!(second.generation.cached);
        assert_eq!(second.data, "once");
        assert_eq!(openai.call_count(), 1);
    }
}
