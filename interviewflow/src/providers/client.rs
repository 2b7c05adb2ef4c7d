//! The uniform provider capability and task-bound handles.

use super::{Completion, CompletionRequest};
use crate::config::{ProviderId, TaskConfig, TaskName};
use crate::errors::LlmError;
use crate::llm::GenerationOptions;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// A configured client for one inference provider.
///
/// Implementations must classify failures into [`LlmError`] variants,
/// in particular [`LlmError::TransientOverload`] for temporary capacity
/// failures, so callers can skip backoff.
#[async_trait]
pub trait ModelClient: Send + Sync + Debug {
    /// The provider this client talks to.
    fn provider(&self) -> ProviderId;

    /// Runs one completion.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError>;
}

/// A client bound to one task's model, temperature and token budget.
///
/// Handles hold configuration only and are shared across concurrent runs.
#[derive(Debug, Clone)]
pub struct ModelHandle {
    provider: ProviderId,
    task: TaskName,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    client: Arc<dyn ModelClient>,
}

impl ModelHandle {
    /// Binds a client to a task.
    #[must_use]
    pub fn new(task: TaskName, model: impl Into<String>, config: &TaskConfig, client: Arc<dyn ModelClient>) -> Self {
        Self {
            provider: client.provider(),
            task,
            model: model.into(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            client,
        }
    }

    /// Returns the provider.
    #[must_use]
    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    /// Returns the task.
    #[must_use]
    pub fn task(&self) -> TaskName {
        self.task
    }

    /// Returns the model identifier.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Builds a request, applying per-call overrides.
    #[must_use]
    pub fn request(&self, prompt: &str, options: &GenerationOptions, json_mode: bool) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            system: options.system.clone(),
            prompt: prompt.to_string(),
            temperature: options.temperature.unwrap_or(self.temperature).clamp(0.0, 2.0),
            max_output_tokens: options.max_output_tokens.unwrap_or(self.max_output_tokens),
            json_mode,
            grounding: options.grounding,
        }
    }

    /// Runs one completion through the bound client.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        self.client.complete(request).await
    }
}
