//! Process-wide provider registry.
//!
//! Clients are resolved once at construction from credentials. Task-bound
//! [`ModelHandle`]s are built lazily on first use per `(provider, task)` pair
//! and shared by every run for the lifetime of the registry.

use super::{ModelClient, ModelHandle};
use crate::config::{Credentials, LlmConfig, ProviderId, ProviderSettings, TaskName};
use crate::errors::LlmError;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builds a concrete client for a provider.
pub trait ClientFactory: Send + Sync {
    /// Builds a client from an API key and connection settings.
    fn build(
        &self,
        provider: ProviderId,
        api_key: &str,
        settings: &ProviderSettings,
    ) -> Result<Arc<dyn ModelClient>, LlmError>;
}

/// Tracks configured providers and hands out task-bound handles.
#[derive(Debug)]
pub struct ProviderRegistry {
    config: Arc<LlmConfig>,
    clients: HashMap<ProviderId, Arc<dyn ModelClient>>,
    handles: DashMap<(ProviderId, TaskName), ModelHandle>,
}

impl ProviderRegistry {
    /// Resolves one client per provider that has credentials.
    ///
    /// A provider whose client cannot be built is logged and left
    /// unavailable; it is never retried.
    pub fn new(config: Arc<LlmConfig>, credentials: &Credentials, factory: &dyn ClientFactory) -> Self {
        let mut clients = HashMap::new();
        for provider in ProviderId::ALL {
            let Some(key) = credentials.get(provider) else {
                debug!(provider = %provider, "No credentials, provider unavailable");
                continue;
            };
            match factory.build(provider, key, &config.provider_settings(provider)) {
                Ok(client) => {
                    clients.insert(provider, client);
                }
                Err(e) => warn!(provider = %provider, error = %e, "Failed to build provider client"),
            }
        }
        info!(available = ?clients.keys().collect::<Vec<_>>(), "Provider registry initialised");
        Self {
            config,
            clients,
            handles: DashMap::new(),
        }
    }

    /// Builds a registry from ready-made clients.
    #[must_use]
    pub fn from_clients(config: Arc<LlmConfig>, clients: Vec<Arc<dyn ModelClient>>) -> Self {
        let clients = clients.into_iter().map(|c| (c.provider(), c)).collect();
        Self {
            config,
            clients,
            handles: DashMap::new(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<LlmConfig> {
        &self.config
    }

    /// Returns true if the provider has a client.
    #[must_use]
    pub fn is_available(&self, provider: ProviderId) -> bool {
        self.clients.contains_key(&provider)
    }

    /// Returns every available provider in canonical order.
    #[must_use]
    pub fn available_providers(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|p| self.is_available(*p))
            .collect()
    }

    /// Returns the handle for `(provider, task)`, building it on first use.
    pub fn handle(&self, provider: ProviderId, task: TaskName) -> Result<ModelHandle, LlmError> {
        if let Some(handle) = self.handles.get(&(provider, task)) {
            return Ok(handle.clone());
        }
        let client = self
            .clients
            .get(&provider)
            .cloned()
            .ok_or(LlmError::ProviderUnavailable { provider })?;
        let task_config = self
            .config
            .task(task)
            .map_err(|e| LlmError::Config(e.to_string()))?;
        let model = if task_config.provider == provider {
            task_config.model.clone()
        } else {
            self.config.provider_settings(provider).default_model
        };
        let handle = ModelHandle::new(task, model, task_config, client);
        debug!(provider = %provider, task = %task, model = handle.model(), "Built model handle");
        Ok(self
            .handles
            .entry((provider, task))
            .or_insert(handle)
            .clone())
    }

    /// Number of handles built so far.
    #[must_use]
    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    /// The provider a pinned task must use, if the task is pinned.
    #[must_use]
    pub fn pinned_provider(&self, task: TaskName) -> Option<ProviderId> {
        self.config
            .task(task)
            .ok()
            .filter(|t| t.pin_provider)
            .map(|t| t.provider)
    }

    /// Ordered, de-duplicated providers for a task, filtered to available ones.
    ///
    /// The task's configured provider comes first, then its fallback chain.
    /// A pinned task has no fallback chain.
    #[must_use]
    pub fn provider_order(&self, task: TaskName) -> Vec<ProviderId> {
        let Ok(task_config) = self.config.task(task) else {
            return Vec::new();
        };
        if task_config.pin_provider {
            return std::iter::once(task_config.provider)
                .filter(|p| self.is_available(*p))
                .collect();
        }
        let mut order = Vec::new();
        let candidates = std::iter::once(task_config.provider)
            .chain(self.config.fallback_chain(task_config).iter().copied());
        for provider in candidates {
            if !order.contains(&provider) && self.is_available(provider) {
                order.push(provider);
            }
        }
        order
    }
}

/// Builds HTTP clients for every supported provider.
#[cfg(feature = "http")]
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpClientFactory;

#[cfg(feature = "http")]
impl ClientFactory for HttpClientFactory {
    fn build(
        &self,
        provider: ProviderId,
        api_key: &str,
        settings: &ProviderSettings,
    ) -> Result<Arc<dyn ModelClient>, LlmError> {
        use super::http::{AnthropicClient, GeminiClient, OpenAiCompatibleClient};

        let client: Arc<dyn ModelClient> = match provider {
            ProviderId::Anthropic => Arc::new(AnthropicClient::new(api_key, settings)?),
            ProviderId::OpenAi | ProviderId::DeepSeek => {
                Arc::new(OpenAiCompatibleClient::new(provider, api_key, settings)?)
            }
            ProviderId::Gemini => Arc::new(GeminiClient::new(api_key, settings)?),
        };
        Ok(client)
    }
}
