//! Curriculum data types.

use crate::errors::ErrorRecord;
use crate::llm::Validate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on rounds in one curriculum.
pub const MAX_ROUNDS: usize = 8;

/// Rounds designed when the request does not say.
pub const DEFAULT_ROUND_COUNT: usize = 4;

/// Input to a generation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurriculumRequest {
    /// Raw job description.
    pub job_description: String,
    /// Hiring company, if known.
    #[serde(default)]
    pub company_name: Option<String>,
    /// Free-form notes about the company.
    #[serde(default)]
    pub company_notes: Option<String>,
    /// Summary of the candidate's background.
    #[serde(default)]
    pub candidate_summary: Option<String>,
    /// Requested number of rounds.
    #[serde(default)]
    pub round_count: Option<usize>,
}

impl CurriculumRequest {
    /// Creates a request for `job_description` with every option unset.
    #[must_use]
    pub fn new(job_description: impl Into<String>) -> Self {
        Self {
            job_description: job_description.into(),
            ..Self::default()
        }
    }

    /// Sets the hiring company.
    #[must_use]
    pub fn with_company(mut self, name: impl Into<String>) -> Self {
        self.company_name = Some(name.into());
        self
    }

    /// Adds notes about the company.
    #[must_use]
    pub fn with_company_notes(mut self, notes: impl Into<String>) -> Self {
        self.company_notes = Some(notes.into());
        self
    }

    /// Adds a candidate summary.
    #[must_use]
    pub fn with_candidate(mut self, summary: impl Into<String>) -> Self {
        self.candidate_summary = Some(summary.into());
        self
    }

    /// Requests `count` rounds.
    #[must_use]
    pub fn with_round_count(mut self, count: usize) -> Self {
        self.round_count = Some(count);
        self
    }

    /// Round count clamped to `1..=MAX_ROUNDS`.
    #[must_use]
    pub fn effective_round_count(&self) -> usize {
        self.round_count
            .unwrap_or(DEFAULT_ROUND_COUNT)
            .clamp(1, MAX_ROUNDS)
    }

    /// Checks the request before a run starts.
    pub fn validate(&self) -> Result<(), String> {
        if self.job_description.trim().is_empty() {
            return Err("job description is empty".to_string());
        }
        if self.round_count == Some(0) {
            return Err("round count must be positive".to_string());
        }
        Ok(())
    }
}

/// Structured job profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedJob {
    /// Role title.
    pub title: String,
    /// Seniority level, if stated.
    #[serde(default)]
    pub seniority: Option<String>,
    /// Required skills. Never empty.
    pub skills: Vec<String>,
    /// Main responsibilities.
    #[serde(default)]
    pub responsibilities: Vec<String>,
}

impl Validate for ParsedJob {
    fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title is empty".to_string());
        }
        if self.skills.is_empty() {
            return Err("no skills extracted".to_string());
        }
        Ok(())
    }
}

/// What the company cares about in interviews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyContext {
    /// Short description of the company.
    pub summary: String,
    /// Stated values.
    #[serde(default)]
    pub values: Vec<String>,
    /// Areas the company is known to probe.
    #[serde(default)]
    pub interview_focus: Vec<String>,
    /// Citation URLs, filled from grounding metadata rather than the model.
    #[serde(default, skip_deserializing)]
    pub sources: Vec<String>,
}

impl Validate for CompanyContext {
    fn validate(&self) -> Result<(), String> {
        if self.summary.trim().is_empty() {
            Err("summary is empty".to_string())
        } else {
            Ok(())
        }
    }
}

/// One planned round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundPlan {
    /// Round title.
    pub title: String,
    /// What the round assesses.
    pub focus: String,
    /// Planned length.
    pub duration_minutes: u32,
    /// Questions to generate, in `1..=20`.
    pub question_count: u32,
}

impl Validate for RoundPlan {
    fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("round title is empty".to_string());
        }
        if !(1..=20).contains(&self.question_count) {
            return Err(format!(
                "round '{}': question_count {} outside 1..=20",
                self.title, self.question_count
            ));
        }
        if self.duration_minutes == 0 {
            return Err(format!("round '{}': duration must be positive", self.title));
        }
        Ok(())
    }
}

/// Round-by-round plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewStructure {
    /// Planned rounds, in interview order.
    pub rounds: Vec<RoundPlan>,
}

impl Validate for InterviewStructure {
    fn validate(&self) -> Result<(), String> {
        if self.rounds.is_empty() {
            return Err("structure has no rounds".to_string());
        }
        if self.rounds.len() > MAX_ROUNDS {
            return Err(format!(
                "structure has {} rounds, at most {MAX_ROUNDS} allowed",
                self.rounds.len()
            ));
        }
        self.rounds.validate()
    }
}

/// A single interview question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// The question as asked.
    pub text: String,
    /// Competency the question targets.
    #[serde(default)]
    pub competency: Option<String>,
    /// Follow-up prompts for the interviewer.
    #[serde(default)]
    pub follow_ups: Vec<String>,
}

/// A generated round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewRound {
    /// Round title.
    pub title: String,
    /// What the round assesses.
    pub focus: String,
    /// Questions, in asking order.
    pub questions: Vec<Question>,
    /// Set on rounds synthesised without a model.
    #[serde(default)]
    pub placeholder: bool,
}

impl InterviewRound {
    /// A round built without a model from its plan.
    #[must_use]
    pub fn placeholder(plan: &RoundPlan) -> Self {
        Self {
            title: plan.title.clone(),
            focus: plan.focus.clone(),
            questions: vec![Question {
                text: format!("Walk me through your experience with {}.", plan.focus),
                competency: Some(plan.focus.clone()),
                follow_ups: Vec::new(),
            }],
            placeholder: true,
        }
    }
}

impl Validate for InterviewRound {
    fn validate(&self) -> Result<(), String> {
        if self.questions.is_empty() {
            return Err(format!("round '{}' has no questions", self.title));
        }
        if let Some(i) = self.questions.iter().position(|q| q.text.trim().is_empty()) {
            return Err(format!("round '{}': question {i} is empty", self.title));
        }
        Ok(())
    }
}

/// Structured quality review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReview {
    /// Overall score in [0, 100].
    pub score: f64,
    /// Zero-based indices of rounds to regenerate. Empty means all.
    #[serde(default)]
    pub weak_rounds: Vec<usize>,
    /// Reviewer notes, fed into refinement.
    #[serde(default)]
    pub feedback: Vec<String>,
}

impl Validate for QualityReview {
    fn validate(&self) -> Result<(), String> {
        if (0.0..=100.0).contains(&self.score) {
            Ok(())
        } else {
            Err(format!("score {} outside [0, 100]", self.score))
        }
    }
}

/// The document handed to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curriculum {
    /// Run that produced the curriculum.
    pub run_id: Uuid,
    /// Role title.
    pub title: String,
    /// Hiring company.
    #[serde(default)]
    pub company: Option<String>,
    /// Final rounds.
    pub rounds: Vec<InterviewRound>,
    /// Last quality score, if the review ran.
    pub quality_score: Option<f64>,
    /// Refinement passes made.
    pub refinement_attempts: u32,
    /// Quality threshold not reached within the refinement ceiling.
    pub best_effort: bool,
    /// Built by the degraded fallback.
    pub degraded: bool,
    /// Citation URLs for the company context.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Warnings recorded during the run.
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Build time.
    pub generated_at: DateTime<Utc>,
}

/// A persisted curriculum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurriculumArtifact {
    /// Id returned by the store.
    pub artifact_id: String,
    /// Run that produced the artifact.
    pub run_id: Uuid,
    /// Last quality score.
    pub quality_score: Option<f64>,
    /// Refinement passes made.
    pub refinement_attempts: u32,
    /// Threshold not reached within the ceiling.
    pub best_effort: bool,
    /// Rounds came from the degraded fallback.
    pub degraded: bool,
    /// Errors recovered from during the run.
    pub errors: Vec<ErrorRecord>,
    /// Warnings recorded during the run.
    pub warnings: Vec<String>,
}

/// A run that produced no artifact.
///
/// The message joins the fatal error with every recorded error and warning.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct CurriculumFailure {
    /// Run id, when the run started.
    pub run_id: Option<Uuid>,
    /// Aggregated, user-facing message.
    pub message: String,
    /// Errors recorded before the failure.
    pub errors: Vec<ErrorRecord>,
    /// Warnings recorded before the failure.
    pub warnings: Vec<String>,
}

impl CurriculumFailure {
    /// Builds the aggregated message.
    #[must_use]
    pub fn new(
        run_id: Option<Uuid>,
        cause: impl std::fmt::Display,
        errors: Vec<ErrorRecord>,
        warnings: Vec<String>,
    ) -> Self {
        let mut message = format!("curriculum generation failed: {cause}");
        if !errors.is_empty() {
            let joined: Vec<String> = errors.iter().map(ToString::to_string).collect();
            message.push_str(&format!("; errors: {}", joined.join("; ")));
        }
        if !warnings.is_empty() {
            message.push_str(&format!("; warnings: {}", warnings.join("; ")));
        }
        Self {
            run_id,
            message,
            errors,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{JsonSchema, ResponseSchema};

    #[test]
    fn test_request_validation() {
        assert!(CurriculumRequest::new("  ").validate().is_err());
        assert!(CurriculumRequest::new("Rust engineer").with_round_count(0).validate().is_err());
        assert_eq!(CurriculumRequest::new("x").effective_round_count(), DEFAULT_ROUND_COUNT);
        assert_eq!(CurriculumRequest::new("x").with_round_count(40).effective_round_count(), MAX_ROUNDS);
    }

    #[test]
    fn test_structure_schema_rejects_bad_rounds() {
        let schema = JsonSchema::<InterviewStructure>::new();
        let ok = r#"{"rounds": [{"title": "Systems", "focus": "design", "duration_minutes": 45, "question_count": 4}]}"#;
        assert_eq!(schema.parse(ok).unwrap().rounds.len(), 1);

        let bad = r#"{"rounds": [{"title": "Systems", "focus": "design", "duration_minutes": 45, "question_count": 0}]}"#;
        let err = schema.parse(bad).unwrap_err().to_string();
        assert!(err.contains("[0]: round 'Systems'"), "{err}");
    }

    #[test]
    fn test_company_sources_are_not_model_supplied() {
        let schema = JsonSchema::<CompanyContext>::new();
        let parsed = schema
            .parse(r#"{"summary": "Rockets", "sources": ["https://evil.example"]}"#)
            .unwrap();
        assert!(parsed.sources.is_empty());
    }

    #[test]
    fn test_failure_message_aggregates() {
        let failure = CurriculumFailure::new(
            None,
            "disk full",
            vec![ErrorRecord::new("generate_rounds", "all providers exhausted")],
            vec!["company analysis skipped".to_string()],
        );
        assert_eq!(
            failure.to_string(),
            "curriculum generation failed: disk full; errors: [generate_rounds] all providers exhausted; warnings: company analysis skipped"
        );
    }
}
