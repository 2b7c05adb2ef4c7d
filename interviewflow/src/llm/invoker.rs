//! Single-provider structured invocation.

use super::{
    cache_key, estimate_cost, GenerationOptions, GenerationResult, RateLimiter, ResponseCache,
    ResponseSchema, SchemaError, StructuredResponse, UsageTracker,
};
use crate::config::{ProviderId, TaskName};
use crate::errors::LlmError;
use crate::providers::ProviderRegistry;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Invokes one provider and enforces the response schema.
///
/// Availability and rate limits are checked before any network call.
/// Validated results are written to the cache unless the call bypasses it.
#[derive(Debug, Clone)]
pub struct StructuredInvoker {
    registry: Arc<ProviderRegistry>,
    limiter: Arc<RateLimiter>,
    cache: Arc<ResponseCache>,
    usage: Arc<UsageTracker>,
}

impl StructuredInvoker {
    /// Creates an invoker over shared services.
    #[must_use]
    pub fn new(
        registry: Arc<ProviderRegistry>,
        limiter: Arc<RateLimiter>,
        cache: Arc<ResponseCache>,
        usage: Arc<UsageTracker>,
    ) -> Self {
        Self {
            registry,
            limiter,
            cache,
            usage,
        }
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Returns the cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Returns the usage tracker.
    #[must_use]
    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    /// Serves a call from the cache if a live entry still satisfies `schema`.
    ///
    /// An entry that no longer parses is dropped.
    pub fn cached<S>(
        &self,
        schema: &S,
        task: TaskName,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Option<StructuredResponse<S::Output>>
    where
        S: ResponseSchema + ?Sized,
    {
        if options.skip_cache {
            return None;
        }
        let key = cache_key(task, prompt, options);
        let generation = self.cache.get(&key)?;
        match schema.parse(&generation.content) {
            Ok(data) => {
                debug!(task = %task, provider = %generation.provider, "Cache hit");
                Some(StructuredResponse { data, generation })
            }
            Err(e) => {
                warn!(task = %task, schema = schema.name(), error = %e, "Dropping cached entry that fails schema");
                self.cache.invalidate(&key);
                None
            }
        }
    }

    /// Calls `provider` once and validates the response against `schema`.
    pub async fn invoke<S>(
        &self,
        provider: ProviderId,
        schema: &S,
        task: TaskName,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<StructuredResponse<S::Output>, LlmError>
    where
        S: ResponseSchema + ?Sized,
    {
        if !self.registry.is_available(provider) {
            return Err(LlmError::ProviderUnavailable { provider });
        }
        if !self.limiter.try_acquire(provider) {
            return Err(LlmError::RateLimited {
                provider,
                retry_after: self.limiter.retry_after(provider),
            });
        }

        let handle = self.registry.handle(provider, task)?;
        let request = handle.request(prompt, options, schema.expects_json());
        let started = Instant::now();
        let completion = handle.complete(&request).await?;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let data = schema.parse(&completion.content).map_err(|e| match e {
            SchemaError::Malformed(message) => LlmError::MalformedResponse { provider, message },
            SchemaError::Violation(message) => LlmError::SchemaValidation {
                provider,
                schema: schema.name().to_string(),
                message,
            },
        })?;

        let generation = GenerationResult {
            provider,
            model: handle.model().to_string(),
            tokens_used: completion.total_tokens(),
            estimated_cost_usd: estimate_cost(
                handle.model(),
                completion.input_tokens,
                completion.output_tokens,
            ),
            content: completion.content,
            latency_ms,
            cached: false,
            grounding: completion.grounding,
        };
        debug!(
            task = %task,
            provider = %provider,
            model = %generation.model,
            tokens = generation.tokens_used,
            latency_ms,
            "Model call succeeded"
        );

        if !options.skip_cache {
            self.cache
                .put(cache_key(task, prompt, options), generation.clone());
        }
        self.usage.record(&generation);
        Ok(StructuredResponse { data, generation })
    }
}
