//! Per-call options and results.

use crate::config::ProviderId;
use crate::providers::GroundingMetadata;
use serde::{Deserialize, Serialize};

/// Per-call overrides on top of the task configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// System instruction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Temperature override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Token budget override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Request search grounding.
    #[serde(default)]
    pub grounding: bool,
    /// Bypass the response cache for reads and writes.
    #[serde(skip)]
    pub skip_cache: bool,
    /// Use only this provider; its failure is final.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forced_provider: Option<ProviderId>,
}

impl GenerationOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the system instruction.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Overrides the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Overrides the token budget.
    #[must_use]
    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Requests search grounding.
    #[must_use]
    pub fn with_grounding(mut self) -> Self {
        self.grounding = true;
        self
    }

    /// Bypasses the cache.
    #[must_use]
    pub fn without_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }

    /// Pins a single provider.
    #[must_use]
    pub fn with_forced_provider(mut self, provider: ProviderId) -> Self {
        self.forced_provider = Some(provider);
        self
    }
}

/// The outcome of one successful model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Provider that served the call.
    pub provider: ProviderId,
    /// Model that served the call.
    pub model: String,
    /// Raw content.
    pub content: String,
    /// Prompt plus completion tokens.
    pub tokens_used: u32,
    /// Estimated cost in USD.
    pub estimated_cost_usd: f64,
    /// Wall-clock latency of the provider call.
    pub latency_ms: u64,
    /// True when served from the response cache.
    pub cached: bool,
    /// Search grounding metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding: Option<GroundingMetadata>,
}

/// Schema-validated data plus the call that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredResponse<T> {
    /// Validated data.
    pub data: T,
    /// Call metadata.
    pub generation: GenerationResult,
}

impl<T> StructuredResponse<T> {
    /// Discards the metadata.
    pub fn into_data(self) -> T {
        self.data
    }
}
