//! Ready-made service stacks over mock clients.

use super::MockModelClient;
use crate::config::LlmConfig;
use crate::llm::{
    BatchOrchestrator, FallbackOrchestrator, LlmService, RateLimiter, ResponseCache,
    StructuredInvoker, UsageTracker, Validate,
};
use crate::providers::{ModelClient, ProviderRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Backoff used by [`test_config`].
pub const TEST_BACKOFF: Duration = Duration::from_millis(25);

/// Built-in configuration with a short fallback backoff.
#[must_use]
pub fn test_config() -> LlmConfig {
    LlmConfig::default().with_fallback_backoff(TEST_BACKOFF)
}

/// Every layer of the model stack, sharing one registry, cache and limiter.
#[derive(Debug)]
pub struct LlmStack {
    /// Configuration.
    pub config: Arc<LlmConfig>,
    /// Registry over the mock clients.
    pub registry: Arc<ProviderRegistry>,
    /// Single-provider invoker.
    pub invoker: Arc<StructuredInvoker>,
    /// Fallback orchestrator.
    pub fallback: FallbackOrchestrator,
    /// Batch orchestrator.
    pub batch: BatchOrchestrator,
    /// Facade.
    pub service: LlmService,
}

/// Stack over `clients` with [`test_config`].
#[must_use]
pub fn llm_stack(clients: Vec<MockModelClient>) -> LlmStack {
    llm_stack_with(clients, test_config())
}

/// Stack over `clients` with a custom configuration.
#[must_use]
pub fn llm_stack_with(clients: Vec<MockModelClient>, config: LlmConfig) -> LlmStack {
    let config = Arc::new(config);
    let clients = clients
        .into_iter()
        .map(|c| Arc::new(c) as Arc<dyn ModelClient>)
        .collect();
    let registry = Arc::new(ProviderRegistry::from_clients(Arc::clone(&config), clients));
    let invoker = Arc::new(StructuredInvoker::new(
        Arc::clone(&registry),
        Arc::new(RateLimiter::from_config(&config)),
        Arc::new(ResponseCache::from_config(&config.cache)),
        Arc::new(UsageTracker::new(config.budget.clone())),
    ));
    LlmStack {
        fallback: FallbackOrchestrator::new(Arc::clone(&invoker)),
        batch: BatchOrchestrator::new(Arc::clone(&invoker)),
        service: LlmService::from_invoker(Arc::clone(&invoker)),
        config,
        registry,
        invoker,
    }
}

/// Facade over `clients` with [`test_config`].
#[must_use]
pub fn service(clients: Vec<MockModelClient>) -> LlmService {
    llm_stack(clients).service
}

/// Facade over `clients` with a custom configuration.
#[must_use]
pub fn service_with(clients: Vec<MockModelClient>, config: LlmConfig) -> LlmService {
    llm_stack_with(clients, config).service
}

/// Minimal structured payload: `{"score": <0..=100>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestScore {
    /// The score.
    pub score: f64,
}

impl Validate for TestScore {
    fn validate(&self) -> Result<(), String> {
        if (0.0..=100.0).contains(&self.score) {
            Ok(())
        } else {
            Err(format!("score {} outside [0, 100]", self.score))
        }
    }
}
