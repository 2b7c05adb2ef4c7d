//! The complete model-layer configuration.

use super::{default_task_table, ProviderId, ProviderSettings, TaskConfig, TaskName};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether responses are cached at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Entry lifetime in seconds.
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
    /// Store-size bound; the oldest entry is evicted on overflow.
    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    3_600
}

fn default_cache_entries() -> usize {
    500
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: default_cache_ttl(),
            max_entries: default_cache_entries(),
        }
    }
}

impl CacheConfig {
    /// Gets the TTL as a Duration.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Spend ceilings. Advisory only: crossing one is logged, never blocked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Daily ceiling in USD.
    #[serde(default = "default_daily_limit")]
    pub daily_limit_usd: f64,
    /// Monthly ceiling in USD.
    #[serde(default = "default_monthly_limit")]
    pub monthly_limit_usd: f64,
}

fn default_daily_limit() -> f64 {
    50.0
}

fn default_monthly_limit() -> f64 {
    1_000.0
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_limit_usd: default_daily_limit(),
            monthly_limit_usd: default_monthly_limit(),
        }
    }
}

/// Quality gate settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementConfig {
    /// Minimum score (0-100) accepted without refinement.
    #[serde(default = "default_threshold")]
    pub quality_threshold: f64,
    /// Hard ceiling on refinement passes per run.
    #[serde(default = "default_max_attempts")]
    pub max_refinement_attempts: u32,
    /// Added to the generation temperature when regenerating weak rounds.
    #[serde(default = "default_temperature_boost")]
    pub temperature_boost: f32,
}

fn default_threshold() -> f64 {
    80.0
}

fn default_max_attempts() -> u32 {
    2
}

fn default_temperature_boost() -> f32 {
    0.2
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            quality_threshold: default_threshold(),
            max_refinement_attempts: default_max_attempts(),
            temperature_boost: default_temperature_boost(),
        }
    }
}

/// Configuration for the whole model layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Per-provider connection settings.
    #[serde(default = "default_providers")]
    pub providers: BTreeMap<ProviderId, ProviderSettings>,
    /// Exactly one entry per task.
    #[serde(default = "default_task_table")]
    pub tasks: BTreeMap<TaskName, TaskConfig>,
    /// Fallback chain for tasks that declare none.
    #[serde(default = "default_fallback_chain")]
    pub default_fallbacks: Vec<ProviderId>,
    /// Response cache.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Fixed delay before the next provider after a non-overload failure.
    #[serde(default = "default_backoff_ms")]
    pub fallback_backoff_ms: u64,
    /// Concurrency ceiling for batch fan-out.
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
    /// Spend ceilings.
    #[serde(default)]
    pub budget: BudgetConfig,
    /// Quality gate.
    #[serde(default)]
    pub refinement: RefinementConfig,
}

fn default_providers() -> BTreeMap<ProviderId, ProviderSettings> {
    ProviderId::ALL
        .into_iter()
        .map(|p| (p, ProviderSettings::defaults_for(p)))
        .collect()
}

fn default_fallback_chain() -> Vec<ProviderId> {
    vec![ProviderId::Anthropic, ProviderId::OpenAi, ProviderId::Gemini]
}

fn default_backoff_ms() -> u64 {
    1_000
}

fn default_batch_concurrency() -> usize {
    5
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            tasks: default_task_table(),
            default_fallbacks: default_fallback_chain(),
            cache: CacheConfig::default(),
            fallback_backoff_ms: default_backoff_ms(),
            batch_concurrency: default_batch_concurrency(),
            budget: BudgetConfig::default(),
            refinement: RefinementConfig::default(),
        }
    }
}

impl LlmConfig {
    /// Creates the built-in configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document and validates it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Replaces the entry for a task.
    #[must_use]
    pub fn with_task(mut self, task: TaskName, config: TaskConfig) -> Self {
        self.tasks.insert(task, config);
        self
    }

    /// Sets the fallback backoff.
    #[must_use]
    pub fn with_fallback_backoff(mut self, backoff: Duration) -> Self {
        self.fallback_backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the cache settings.
    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Validates every startup rule, collecting all violations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut issues = Vec::new();

        for task in TaskName::ALL {
            match self.tasks.get(&task) {
                Some(config) => issues.extend(config.issues(task)),
                None => issues.push(format!("task '{task}' has no configuration")),
            }
        }

        for (provider, settings) in &self.providers {
            if settings.requests_per_minute == 0 {
                issues.push(format!("provider '{provider}': requests_per_minute must be positive"));
            }
            if settings.default_model.trim().is_empty() {
                issues.push(format!("provider '{provider}': default_model must not be empty"));
            }
        }

        if self.batch_concurrency == 0 {
            issues.push("batch_concurrency must be positive".to_string());
        }
        if self.cache.enabled && self.cache.max_entries == 0 {
            issues.push("cache.max_entries must be positive when caching is enabled".to_string());
        }
        if !(0.0..=100.0).contains(&self.refinement.quality_threshold) {
            issues.push(format!(
                "refinement.quality_threshold {} outside [0, 100]",
                self.refinement.quality_threshold
            ));
        }
        if self.budget.daily_limit_usd < 0.0 || self.budget.monthly_limit_usd < 0.0 {
            issues.push("budget limits must not be negative".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::invalid(issues))
        }
    }

    /// Returns the configuration for a task.
    pub fn task(&self, task: TaskName) -> Result<&TaskConfig, ConfigError> {
        self.tasks.get(&task).ok_or(ConfigError::MissingTask(task))
    }

    /// Returns the settings for a provider, falling back to built-ins.
    #[must_use]
    pub fn provider_settings(&self, provider: ProviderId) -> ProviderSettings {
        self.providers
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| ProviderSettings::defaults_for(provider))
    }

    /// Fallback chain for a task: its own list, or the global one.
    #[must_use]
    pub fn fallback_chain<'a>(&'a self, task: &'a TaskConfig) -> &'a [ProviderId] {
        if task.fallbacks.is_empty() {
            &self.default_fallbacks
        } else {
            &task.fallbacks
        }
    }

    /// Requests-per-minute ceilings keyed by provider.
    #[must_use]
    pub fn rate_limits(&self) -> HashMap<ProviderId, u32> {
        ProviderId::ALL
            .into_iter()
            .map(|p| (p, self.provider_settings(p).requests_per_minute))
            .collect()
    }

    /// Gets the fallback backoff as a Duration.
    #[must_use]
    pub fn fallback_backoff(&self) -> Duration {
        Duration::from_millis(self.fallback_backoff_ms)
    }
}
