//! Bounded, order-preserving batch fan-out.

use super::fallback::try_in_order;
use super::{GenerationOptions, ResponseSchema, StructuredInvoker, StructuredResponse};
use crate::config::{ProviderId, TaskName};
use crate::errors::LlmError;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Runs N independent prompts for one task through one provider at a time.
///
/// If any item fails, the whole batch is retried on the next provider.
/// Results from different providers are never mixed.
#[derive(Debug, Clone)]
pub struct BatchOrchestrator {
    invoker: Arc<StructuredInvoker>,
    concurrency: usize,
    backoff: Duration,
}

impl BatchOrchestrator {
    /// Creates an orchestrator using the configured concurrency and backoff.
    #[must_use]
    pub fn new(invoker: Arc<StructuredInvoker>) -> Self {
        let config = invoker.registry().config();
        let concurrency = config.batch_concurrency.max(1);
        let backoff = config.fallback_backoff();
        Self {
            invoker,
            concurrency,
            backoff,
        }
    }

    /// Overrides the concurrency ceiling.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Overrides the backoff.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns the concurrency ceiling.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Invokes every prompt; `output[i]` answers `prompts[i]`.
    ///
    /// The cache serves the batch only when every item hits and all hits
    /// came from the same provider.
    pub async fn invoke_batch<S>(
        &self,
        task: TaskName,
        schema: &S,
        prompts: &[String],
        options: &GenerationOptions,
    ) -> Result<Vec<StructuredResponse<S::Output>>, LlmError>
    where
        S: ResponseSchema + ?Sized,
    {
        if prompts.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(hits) = self.all_cached(schema, task, prompts, options) {
            debug!(task = %task, items = prompts.len(), "Batch served from cache");
            return Ok(hits);
        }
        let forced = options
            .forced_provider
            .or_else(|| self.invoker.registry().pinned_provider(task));
        if let Some(provider) = forced {
            return self.run_on(provider, schema, task, prompts, options).await;
        }

        let primary = self
            .invoker
            .registry()
            .config()
            .task(task)
            .map_err(|e| LlmError::Config(e.to_string()))?
            .provider;
        let order = self.invoker.registry().provider_order(task);
        try_in_order(task, primary, &order, self.backoff, move |provider| {
            self.run_on(provider, schema, task, prompts, options)
        })
        .await
    }

    fn all_cached<S>(
        &self,
        schema: &S,
        task: TaskName,
        prompts: &[String],
        options: &GenerationOptions,
    ) -> Option<Vec<StructuredResponse<S::Output>>>
    where
        S: ResponseSchema + ?Sized,
    {
        let hits: Vec<_> = prompts
            .iter()
            .map(|prompt| self.invoker.cached(schema, task, prompt, options))
            .collect::<Option<_>>()?;
        let provider = hits.first()?.generation.provider;
        hits.iter()
            .all(|hit| hit.generation.provider == provider)
            .then_some(hits)
    }

    async fn run_on<S>(
        &self,
        provider: ProviderId,
        schema: &S,
        task: TaskName,
        prompts: &[String],
        options: &GenerationOptions,
    ) -> Result<Vec<StructuredResponse<S::Output>>, LlmError>
    where
        S: ResponseSchema + ?Sized,
    {
        debug!(
            task = %task,
            provider = %provider,
            items = prompts.len(),
            concurrency = self.concurrency,
            "Running batch"
        );
        let calls: Vec<_> = prompts
            .iter()
            .map(|prompt| self.invoker.invoke(provider, schema, task, prompt.as_str(), options))
            .collect();
        stream::iter(calls)
            .buffered(self.concurrency)
            .try_collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskConfig;
    use crate::llm::{JsonSchema, PlainText};
    use crate::providers::CompletionRequest;
    use crate::testing::{fixtures, MockModelClient, MockOutcome, TestScore};
    use pretty_assertions::assert_eq;

    fn prompts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("item-{i}")).collect()
    }

    fn echo_score(request: &CompletionRequest) -> MockOutcome {
        let index: u32 = request
            .prompt
            .trim_start_matches("item-")
            .parse()
            .unwrap_or(0);
        MockOutcome::content(format!(r#"{{"score": {index}}}"#))
    }

    #[tokio::test]
    async fn test_output_order_matches_input_order() {
        // Later items finish first.
        let openai = MockModelClient::new(ProviderId::OpenAi)
            .with_responder(echo_score)
            .with_latency_fn(|request| {
                let index: u64 = request.prompt.trim_start_matches("item-").parse().unwrap_or(0);
                Duration::from_millis(50 - index * 4)
            });
        let stack = fixtures::llm_stack(vec![openai]);

        let results = stack
            .batch
            .invoke_batch(
                TaskName::QualityEvaluation,
                &JsonSchema::<TestScore>::new(),
                &prompts(12),
                &GenerationOptions::default(),
            )
            .await
            .unwrap();

        let scores: Vec<f64> = results.iter().map(|r| r.data.score).collect();
        assert_eq!(scores, (0..12).map(f64::from).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_whole_batch_retried_on_next_provider() {
        // RoundGeneration: Anthropic first, then OpenAI.
        let anthropic = MockModelClient::new(ProviderId::Anthropic).with_responder(|request| {
            if request.prompt == "item-2" {
                MockOutcome::content(r#"{"score": "bad"}"#)
            } else {
                echo_score(request)
            }
        });
        let openai = MockModelClient::new(ProviderId::OpenAi).with_responder(echo_score);
        let stack = fixtures::llm_stack(vec![anthropic, openai.clone()]);

        let results = stack
            .batch
            .invoke_batch(
                TaskName::RoundGeneration,
                &JsonSchema::<TestScore>::new(),
                &prompts(5),
                &GenerationOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 5);
        assert_eq!(openai.call_count(), 5);
        assert!(results.iter().all(|r| r.generation.provider == ProviderId::OpenAi));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let openai = MockModelClient::new(ProviderId::OpenAi)
            .with_default(MockOutcome::content("ok"))
            .with_latency(Duration::from_millis(20));
        let stack = fixtures::llm_stack(vec![openai.clone()]);

        stack
            .batch
            .invoke_batch(TaskName::JobParsing, &PlainText, &prompts(12), &GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(openai.call_count(), 12);
        assert!(openai.peak_in_flight() <= stack.batch.concurrency());
        assert!(openai.peak_in_flight() > 1);
    }

    #[tokio::test]
    async fn test_fully_cached_batch_skips_providers() {
        let openai = MockModelClient::new(ProviderId::OpenAi).with_responder(echo_score);
        let stack = fixtures::llm_stack(vec![openai.clone()]);
        let schema = JsonSchema::<TestScore>::new();
        let options = GenerationOptions::default();

        stack
            .batch
            .invoke_batch(TaskName::QualityEvaluation, &schema, &prompts(3), &options)
            .await
            .unwrap();
        let again = stack
            .batch
            .invoke_batch(TaskName::QualityEvaluation, &schema, &prompts(3), &options)
            .await
            .unwrap();

        assert_eq!(openai.call_count(), 3);
        assert!(again.iter().all(|r| r.generation.cached));
    }

    #[tokio::test]
    async fn test_cached_items_from_mixed_providers_are_regenerated() {
        // item-1 overloads Anthropic, so the single calls cache one answer per provider.
        let anthropic = MockModelClient::new(ProviderId::Anthropic).with_responder(|request| {
            if request.prompt == "item-1" {
                MockOutcome::Overloaded
            } else {
                echo_score(request)
            }
        });
        let openai = MockModelClient::new(ProviderId::OpenAi).with_responder(echo_score);
        let stack = fixtures::llm_stack(vec![anthropic, openai.clone()]);
        let schema = JsonSchema::<TestScore>::new();
        let options = GenerationOptions::default();

        for prompt in prompts(2) {
            stack
                .fallback
                .invoke(TaskName::RoundGeneration, &schema, &prompt, &options)
                .await
                .unwrap();
        }
        assert_eq!(openai.call_count(), 1);

        let results = stack
            .batch
            .invoke_batch(TaskName::RoundGeneration, &schema, &prompts(2), &options)
            .await
            .unwrap();

        assert_eq!(openai.call_count(), 3);
        assert!(results
            .iter()
            .all(|r| r.generation.provider == ProviderId::OpenAi && !r.generation.cached));
    }

    #[tokio::test]
    async fn test_pinned_task_batch_does_not_fall_back() {
        let config = fixtures::test_config().with_task(
            TaskName::RoundGeneration,
            TaskConfig::new(ProviderId::Anthropic, "claude-sonnet-4-20250514", 0.7, 6_000)
                .with_fallbacks([ProviderId::OpenAi])
                .pinned(),
        );
        let anthropic = MockModelClient::new(ProviderId::Anthropic).with_default(MockOutcome::Overloaded);
        let openai = MockModelClient::new(ProviderId::OpenAi).with_responder(echo_score);
        let stack = fixtures::llm_stack_with(vec![anthropic, openai.clone()], config);

        let err = stack
            .batch
            .invoke_batch(TaskName::RoundGeneration, &PlainText, &prompts(3), &GenerationOptions::default())
            .await
            .unwrap_err();

        assert!(err.is_transient_overload(), "{err:?}");
        assert_eq!(openai.call_count(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_batch_reports_providers() {
        let anthropic = MockModelClient::new(ProviderId::Anthropic).with_default(MockOutcome::Overloaded);
        let openai = MockModelClient::new(ProviderId::OpenAi).with_default(MockOutcome::Overloaded);
        let stack = fixtures::llm_stack(vec![anthropic, openai]);

        let err = stack
            .batch
            .invoke_batch(TaskName::RoundGeneration, &PlainText, &prompts(3), &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LlmError::AllProvidersExhausted { ref attempted, .. }
                if *attempted == vec![ProviderId::Anthropic, ProviderId::OpenAi]
        ));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let stack = fixtures::llm_stack(Vec::new());
        let results = stack
            .batch
            .invoke_batch(TaskName::JobParsing, &PlainText, &[], &GenerationOptions::default())
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
