//! Wire-independent request and response types.

use serde::{Deserialize, Serialize};

/// A single completion request, already resolved to a concrete model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    /// Model identifier.
    pub model: String,
    /// Optional system instruction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// User prompt.
    pub prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Output token budget.
    pub max_output_tokens: u32,
    /// Ask the provider for a JSON-only response.
    pub json_mode: bool,
    /// Ask the provider to ground the answer in web search, if supported.
    pub grounding: bool,
}

/// A raw completion returned by a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Text content.
    pub content: String,
    /// Prompt tokens billed.
    pub input_tokens: u32,
    /// Completion tokens billed.
    pub output_tokens: u32,
    /// Search grounding metadata, when the provider returned any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding: Option<GroundingMetadata>,
}

impl Completion {
    /// Creates a completion with content and token counts.
    #[must_use]
    pub fn new(content: impl Into<String>, input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            content: content.into(),
            input_tokens,
            output_tokens,
            grounding: None,
        }
    }

    /// Returns total tokens.
    #[must_use]
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Citation and search metadata attached to a grounded response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingMetadata {
    /// Sources the answer was grounded on.
    #[serde(default)]
    pub citations: Vec<Citation>,
    /// Search queries the provider issued.
    #[serde(default)]
    pub search_queries: Vec<String>,
}

impl GroundingMetadata {
    /// Returns true if there is nothing to report.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.citations.is_empty() && self.search_queries.is_empty()
    }
}

/// One grounding source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Source URL.
    pub url: String,
    /// Source title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}
