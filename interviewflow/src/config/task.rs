//! Logical tasks and their model settings.

use super::ProviderId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A named unit of model work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskName {
    /// Extract a structured job profile from a job description.
    JobParsing,
    /// Summarise the hiring company's context.
    CompanyAnalysis,
    /// Design the round-by-round interview structure.
    StructureDesign,
    /// Generate the questions for one round.
    RoundGeneration,
    /// Score the generated curriculum.
    QualityEvaluation,
    /// Regenerate weak rounds.
    Refinement,
}

impl TaskName {
    /// Every task, in pipeline order.
    pub const ALL: [Self; 6] = [
        Self::JobParsing,
        Self::CompanyAnalysis,
        Self::StructureDesign,
        Self::RoundGeneration,
        Self::QualityEvaluation,
        Self::Refinement,
    ];

    /// Returns the snake_case task name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JobParsing => "job_parsing",
            Self::CompanyAnalysis => "company_analysis",
            Self::StructureDesign => "structure_design",
            Self::RoundGeneration => "round_generation",
            Self::QualityEvaluation => "quality_evaluation",
            Self::Refinement => "refinement",
        }
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model settings for one task.
///
/// `provider` names the most capable provider for the task and is tried
/// first; it is not a hard binding unless `pin_provider` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Preferred provider.
    pub provider: ProviderId,
    /// Model identifier on the preferred provider.
    pub model: String,
    /// Sampling temperature in [0, 2].
    pub temperature: f32,
    /// Output token budget.
    pub max_output_tokens: u32,
    /// Task-specific fallback chain. Empty means the global chain.
    #[serde(default)]
    pub fallbacks: Vec<ProviderId>,
    /// Never fall back: failure of `provider` is final.
    #[serde(default)]
    pub pin_provider: bool,
}

impl TaskConfig {
    /// Creates a task config with no task-specific fallbacks.
    #[must_use]
    pub fn new(provider: ProviderId, model: impl Into<String>, temperature: f32, max_output_tokens: u32) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_output_tokens,
            fallbacks: Vec::new(),
            pin_provider: false,
        }
    }

    /// Sets the fallback chain.
    #[must_use]
    pub fn with_fallbacks(mut self, fallbacks: impl IntoIterator<Item = ProviderId>) -> Self {
        self.fallbacks = fallbacks.into_iter().collect();
        self
    }

    /// Pins the task to its preferred provider.
    #[must_use]
    pub fn pinned(mut self) -> Self {
        self.pin_provider = true;
        self
    }

    /// Returns validation issues for this entry.
    #[must_use]
    pub fn issues(&self, task: TaskName) -> Vec<String> {
        let mut issues = Vec::new();
        if !(0.0..=2.0).contains(&self.temperature) {
            issues.push(format!(
                "task '{task}': temperature {} outside [0, 2]",
                self.temperature
            ));
        }
        if self.max_output_tokens == 0 {
            issues.push(format!("task '{task}': max_output_tokens must be positive"));
        }
        if self.model.trim().is_empty() {
            issues.push(format!("task '{task}': model must not be empty"));
        }
        if self.fallbacks.contains(&self.provider) {
            issues.push(format!(
                "task '{task}': primary provider '{}' appears in its own fallback list",
                self.provider
            ));
        }
        issues
    }
}

/// The built-in task table.
#[must_use]
pub fn default_task_table() -> BTreeMap<TaskName, TaskConfig> {
    use ProviderId::{Anthropic, DeepSeek, Gemini, OpenAi};

    BTreeMap::from([
        (
            TaskName::JobParsing,
            TaskConfig::new(OpenAi, "gpt-4o-mini", 0.2, 2_000).with_fallbacks([Anthropic, Gemini]),
        ),
        (
            TaskName::CompanyAnalysis,
            TaskConfig::new(Gemini, "gemini-2.0-flash", 0.3, 2_000)
                .with_fallbacks([OpenAi, Anthropic]),
        ),
        (
            TaskName::StructureDesign,
            TaskConfig::new(Anthropic, "claude-sonnet-4-20250514", 0.4, 4_000)
                .with_fallbacks([OpenAi, Gemini]),
        ),
        (
            TaskName::RoundGeneration,
            TaskConfig::new(Anthropic, "claude-sonnet-4-20250514", 0.7, 6_000)
                .with_fallbacks([OpenAi, DeepSeek]),
        ),
        (
            TaskName::QualityEvaluation,
            TaskConfig::new(OpenAi, "gpt-4o", 0.1, 2_000).with_fallbacks([Anthropic, Gemini]),
        ),
        (
            TaskName::Refinement,
            TaskConfig::new(Anthropic, "claude-sonnet-4-20250514", 0.8, 6_000)
                .with_fallbacks([OpenAi, DeepSeek]),
        ),
    ])
}
