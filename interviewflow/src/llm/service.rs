//! The facade pipeline nodes use for every model call.

use super::{
    BatchOrchestrator, CacheStats, FallbackOrchestrator, GenerationOptions, GenerationResult,
    JsonSchema, PlainText, RateLimiter, ResponseCache, ResponseSchema, StructuredInvoker,
    StructuredResponse, UsageSnapshot, UsageTracker, Validate,
};
use crate::config::{LlmConfig, ProviderId, TaskName};
use crate::errors::LlmError;
use crate::providers::ProviderRegistry;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Provider-agnostic model access: free text, structured and batch calls.
///
/// One instance is built per process and shared by reference across
/// concurrent runs.
#[derive(Debug, Clone)]
pub struct LlmService {
    invoker: Arc<StructuredInvoker>,
    fallback: FallbackOrchestrator,
    batch: BatchOrchestrator,
}

impl LlmService {
    /// Builds the limiter, cache and usage tracker from the registry's config.
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        let config = Arc::clone(registry.config());
        let invoker = StructuredInvoker::new(
            registry,
            Arc::new(RateLimiter::from_config(&config)),
            Arc::new(ResponseCache::from_config(&config.cache)),
            Arc::new(UsageTracker::new(config.budget.clone())),
        );
        Self::from_invoker(Arc::new(invoker))
    }

    /// Builds the service over an existing invoker.
    #[must_use]
    pub fn from_invoker(invoker: Arc<StructuredInvoker>) -> Self {
        Self {
            fallback: FallbackOrchestrator::new(Arc::clone(&invoker)),
            batch: BatchOrchestrator::new(Arc::clone(&invoker)),
            invoker,
        }
    }

    /// Validates `config`, reads credentials from the environment and
    /// connects every provider that has a key.
    #[cfg(feature = "http")]
    pub fn from_env(config: LlmConfig) -> Result<Self, crate::errors::ConfigError> {
        use crate::config::Credentials;
        use crate::providers::HttpClientFactory;

        config.validate()?;
        let registry = ProviderRegistry::new(Arc::new(config), &Credentials::from_env(), &HttpClientFactory);
        Ok(Self::new(Arc::new(registry)))
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &LlmConfig {
        self.invoker.registry().config()
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        self.invoker.registry()
    }

    /// Returns true if `provider` has a client.
    #[must_use]
    pub fn is_available(&self, provider: ProviderId) -> bool {
        self.registry().is_available(provider)
    }

    /// Providers that would be tried for `task`, in order.
    #[must_use]
    pub fn provider_order(&self, task: TaskName) -> Vec<ProviderId> {
        self.fallback.provider_order(task)
    }

    /// Cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.invoker.cache().stats()
    }

    /// Spend and token totals.
    #[must_use]
    pub fn usage(&self) -> UsageSnapshot {
        self.invoker.usage().snapshot()
    }

    /// Free-text generation with fallback.
    pub async fn generate(
        &self,
        task: TaskName,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResult, LlmError> {
        self.fallback
            .invoke(task, &PlainText, prompt, options)
            .await
            .map(|r| r.generation)
    }

    /// Structured generation with fallback, validated as `T`.
    pub async fn invoke_structured<T>(
        &self,
        task: TaskName,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<StructuredResponse<T>, LlmError>
    where
        T: DeserializeOwned + Validate + Send + 'static,
    {
        self.fallback
            .invoke(task, &JsonSchema::<T>::new(), prompt, options)
            .await
    }

    /// Structured generation with fallback and a caller-supplied schema.
    pub async fn invoke_with<S>(
        &self,
        task: TaskName,
        schema: &S,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<StructuredResponse<S::Output>, LlmError>
    where
        S: ResponseSchema + ?Sized,
    {
        self.fallback.invoke(task, schema, prompt, options).await
    }

    /// Batch structured generation; `output[i]` answers `prompts[i]`.
    pub async fn invoke_batch<T>(
        &self,
        task: TaskName,
        prompts: &[String],
        options: &GenerationOptions,
    ) -> Result<Vec<StructuredResponse<T>>, LlmError>
    where
        T: DeserializeOwned + Validate + Send + 'static,
    {
        self.batch
            .invoke_batch(task, &JsonSchema::<T>::new(), prompts, options)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockModelClient, MockOutcome, TestScore};

    #[tokio::test]
    async fn test_generate_returns_plain_text() {
        let gemini = MockModelClient::new(ProviderId::Gemini).with_default(MockOutcome::content("  Acme builds rockets. "));
        let service = fixtures::service(vec![gemini]);

        let result = service
            .generate(TaskName::CompanyAnalysis, "about acme", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(result.provider, ProviderId::Gemini);
        assert_eq!(result.model, "gemini-2.0-flash");
        assert_eq!(result.content, "  Acme builds rockets. ");
    }

    #[tokio::test]
    async fn test_invoke_structured_and_batch() {
        let openai = MockModelClient::new(ProviderId::OpenAi).with_default(MockOutcome::content(r#"{"score": 81}"#));
        let service = fixtures::service(vec![openai]);

        let one: StructuredResponse<TestScore> = service
            .invoke_structured(TaskName::QualityEvaluation, "rate", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(one.data.score, 81.0);

        let many: Vec<StructuredResponse<TestScore>> = service
            .invoke_batch(
                TaskName::QualityEvaluation,
                &["a".to_string(), "b".to_string()],
                &GenerationOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(many.len(), 2);
        assert_eq!(service.usage().providers[&ProviderId::OpenAi].calls, 3);
        assert_eq!(service.cache_stats().entries, 3);
    }

    #[test]
    fn test_exposes_provider_order() {
        let service = fixtures::service(vec![
            MockModelClient::new(ProviderId::Gemini),
            MockModelClient::new(ProviderId::Anthropic),
        ]);
        assert_eq!(
            service.provider_order(TaskName::CompanyAnalysis),
            vec![ProviderId::Gemini, ProviderId::Anthropic]
        );
        assert!(!service.is_available(ProviderId::OpenAi));
    }
}
