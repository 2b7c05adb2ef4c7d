//! Curriculum pipeline nodes.

use super::models::{
    CompanyContext, Curriculum, InterviewRound, InterviewStructure, ParsedJob, QualityReview,
    RoundPlan,
};
use super::prompts;
use super::state::{CurriculumState, CurriculumUpdate};
use super::store::CurriculumStore;
use crate::config::TaskName;
use crate::errors::NodeError;
use crate::llm::{GenerationOptions, LlmService};
use crate::pipeline::{
    Node, NodeResult, QualityDecision, QualityLoop, QualityPhase, RefinementPolicy, RunContext,
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Start node.
pub const PARSE_JOB: &str = "parse_job";
/// Optional company analysis.
pub const ANALYZE_COMPANY: &str = "analyze_company";
/// Round planning.
pub const DESIGN_STRUCTURE: &str = "design_structure";
/// Batch round generation.
pub const GENERATE_ROUNDS: &str = "generate_rounds";
/// Regenerates weak rounds.
pub const REFINE_ROUNDS: &str = "refine_rounds";
/// Quality gate.
pub const EVALUATE_QUALITY: &str = "evaluate_quality";
/// Recovery node.
pub const DEGRADED_FALLBACK: &str = "degraded_fallback";
/// Terminal node.
pub const PERSIST: &str = "persist";

type NodeOutput = Result<NodeResult<CurriculumUpdate>, NodeError>;

fn structured_options() -> GenerationOptions {
    GenerationOptions::new().with_system(prompts::SYSTEM)
}

fn require_job(state: &CurriculumState) -> anyhow::Result<&ParsedJob> {
    state.job.as_ref().context("job profile missing")
}

/// Extracts a structured job profile.
pub struct ParseJobNode {
    service: Arc<LlmService>,
}

impl ParseJobNode {
    /// Creates the node over `service`.
    pub fn new(service: Arc<LlmService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Node<CurriculumState> for ParseJobNode {
    fn name(&self) -> &str {
        PARSE_JOB
    }

    async fn execute(&self, state: &CurriculumState, _ctx: &RunContext) -> NodeOutput {
        let prompt = prompts::job_analysis(&state.request);
        let job = self
            .service
            .invoke_structured::<ParsedJob>(TaskName::JobParsing, &prompt, &structured_options())
            .await?
            .into_data();
        Ok(NodeResult::update(CurriculumUpdate {
            job: Some(job),
            ..CurriculumUpdate::default()
        }))
    }
}

/// Summarises the hiring company with search grounding.
///
/// Company context is optional: failures become warnings, not errors.
pub struct AnalyzeCompanyNode {
    service: Arc<LlmService>,
}

impl AnalyzeCompanyNode {
    /// Creates the node over `service`.
    pub fn new(service: Arc<LlmService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Node<CurriculumState> for AnalyzeCompanyNode {
    fn name(&self) -> &str {
        ANALYZE_COMPANY
    }

    async fn execute(&self, state: &CurriculumState, ctx: &RunContext) -> NodeOutput {
        let Some(company) = state.request.company_name.as_deref().filter(|c| !c.trim().is_empty()) else {
            return Ok(NodeResult::update(CurriculumUpdate::default()));
        };
        let job = require_job(state)?;
        let prompt = prompts::company_analysis(company, state.request.company_notes.as_deref(), job);
        let options = structured_options().with_grounding();

        match self
            .service
            .invoke_structured::<CompanyContext>(TaskName::CompanyAnalysis, &prompt, &options)
            .await
        {
            Ok(response) => {
                let sources = response
                    .generation
                    .grounding
                    .as_ref()
                    .map(|g| g.citations.iter().map(|c| c.url.clone()).collect())
                    .unwrap_or_default();
                let context = CompanyContext {
                    sources,
                    ..response.data
                };
                Ok(NodeResult::update(CurriculumUpdate {
                    company: Some(context),
                    ..CurriculumUpdate::default()
                }))
            }
            Err(e) => {
                warn!(run_id = %ctx.run_id(), company = %company, error = %e, "Company analysis skipped");
                Ok(NodeResult::update(CurriculumUpdate::warning(format!(
                    "company analysis for '{company}' skipped: {e}"
                ))))
            }
        }
    }
}

/// Plans the rounds.
pub struct DesignStructureNode {
    service: Arc<LlmService>,
}

impl DesignStructureNode {
    /// Creates the node over `service`.
    pub fn new(service: Arc<LlmService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Node<CurriculumState> for DesignStructureNode {
    fn name(&self) -> &str {
        DESIGN_STRUCTURE
    }

    async fn execute(&self, state: &CurriculumState, _ctx: &RunContext) -> NodeOutput {
        let job = require_job(state)?;
        let prompt = prompts::interview_structure(&state.request, job, state.company.as_ref());
        let structure = self
            .service
            .invoke_structured::<InterviewStructure>(TaskName::StructureDesign, &prompt, &structured_options())
            .await?
            .into_data();

        let mut update = CurriculumUpdate::default();
        let requested = state.request.effective_round_count();
        if structure.rounds.len() != requested {
            update.warnings.push(format!(
                "requested {requested} rounds, structure has {}",
                structure.rounds.len()
            ));
        }
        update.structure = Some(structure);
        Ok(NodeResult::update(update))
    }
}

/// Generates every planned round in one batch.
pub struct GenerateRoundsNode {
    service: Arc<LlmService>,
}

impl GenerateRoundsNode {
    /// Creates the node over `service`.
    pub fn new(service: Arc<LlmService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Node<CurriculumState> for GenerateRoundsNode {
    fn name(&self) -> &str {
        GENERATE_ROUNDS
    }

    async fn execute(&self, state: &CurriculumState, ctx: &RunContext) -> NodeOutput {
        let job = require_job(state)?;
        let structure = state.structure.as_ref().context("interview structure missing")?;
        let total = structure.rounds.len();
        let prompts: Vec<String> = structure
            .rounds
            .iter()
            .enumerate()
            .map(|(i, plan)| prompts::interview_round(job, plan, i, total))
            .collect();

        let rounds: Vec<InterviewRound> = self
            .service
            .invoke_batch::<InterviewRound>(TaskName::RoundGeneration, &prompts, &structured_options())
            .await?
            .into_iter()
            .map(|r| r.into_data())
            .collect();
        info!(run_id = %ctx.run_id(), rounds = rounds.len(), "Rounds generated");

        Ok(NodeResult::update(CurriculumUpdate {
            rounds: Some(rounds),
            quality_phase: Some(QualityPhase::Generated),
            ..CurriculumUpdate::default()
        }))
    }
}

/// Quality gate. Routes back to refinement or forward to persistence.
pub struct EvaluateQualityNode {
    service: Arc<LlmService>,
    policy: RefinementPolicy,
}

impl EvaluateQualityNode {
    /// Creates the gate with its threshold and ceiling.
    pub fn new(service: Arc<LlmService>, policy: RefinementPolicy) -> Self {
        Self { service, policy }
    }
}

#[async_trait]
impl Node<CurriculumState> for EvaluateQualityNode {
    fn name(&self) -> &str {
        EVALUATE_QUALITY
    }

    async fn execute(&self, state: &CurriculumState, ctx: &RunContext) -> NodeOutput {
        let job = require_job(state)?;
        let mut gate = QualityLoop::resume(self.policy, state.quality_phase, state.refinement_attempts);
        let prompt = prompts::quality_review(job, &state.rounds, self.policy.threshold());
        let review = self
            .service
            .invoke_structured::<QualityReview>(
                TaskName::QualityEvaluation,
                &prompt,
                &structured_options().without_cache(),
            )
            .await?
            .into_data();

        let decision = gate
            .evaluate(review.score)
            .map_err(|e| NodeError::fatal(e.to_string()))?;
        info!(
            run_id = %ctx.run_id(),
            score = review.score,
            attempts = gate.attempts(),
            decision = ?decision,
            "Quality evaluated"
        );

        let mut update = CurriculumUpdate {
            quality_phase: Some(gate.phase()),
            ..CurriculumUpdate::default()
        };
        let next = match decision {
            QualityDecision::Refine => REFINE_ROUNDS,
            QualityDecision::Accept => PERSIST,
            QualityDecision::AcceptBestEffort => {
                update.warnings.push(format!(
                    "quality score {} below threshold {} after {} refinement attempts; persisting best effort",
                    review.score,
                    self.policy.threshold(),
                    gate.attempts()
                ));
                PERSIST
            }
        };
        update.review = Some(review);
        Ok(NodeResult::goto(update, next))
    }
}

/// Regenerates the rounds the reviewer flagged, at a higher temperature.
pub struct RefineRoundsNode {
    service: Arc<LlmService>,
    policy: RefinementPolicy,
    temperature_boost: f32,
}

impl RefineRoundsNode {
    /// Creates the node. `temperature_boost` is added to the refinement task temperature.
    pub fn new(service: Arc<LlmService>, policy: RefinementPolicy, temperature_boost: f32) -> Self {
        Self {
            service,
            policy,
            temperature_boost,
        }
    }

    fn weak_rounds(review: &QualityReview, total: usize) -> Vec<usize> {
        let flagged: BTreeSet<usize> = review.weak_rounds.iter().copied().filter(|i| *i < total).collect();
        if flagged.is_empty() {
            (0..total).collect()
        } else {
            flagged.into_iter().collect()
        }
    }
}

#[async_trait]
impl Node<CurriculumState> for RefineRoundsNode {
    fn name(&self) -> &str {
        REFINE_ROUNDS
    }

    async fn execute(&self, state: &CurriculumState, ctx: &RunContext) -> NodeOutput {
        let review = state.review.as_ref().context("quality review missing")?;
        let mut gate = QualityLoop::resume(self.policy, state.quality_phase, state.refinement_attempts);
        let attempts = gate
            .complete_refinement()
            .map_err(|e| NodeError::fatal(e.to_string()))?;

        let indices = Self::weak_rounds(review, state.rounds.len());
        let prompts: Vec<String> = indices
            .iter()
            .map(|&i| prompts::round_refinement(&state.rounds[i], i, review))
            .collect();
        let base = self
            .service
            .config()
            .task(TaskName::Refinement)
            .map(|t| t.temperature)
            .unwrap_or(0.7);
        let options = structured_options()
            .with_temperature((base + self.temperature_boost).min(2.0))
            .without_cache();

        let refined = self
            .service
            .invoke_batch::<InterviewRound>(TaskName::Refinement, &prompts, &options)
            .await?;
        info!(run_id = %ctx.run_id(), attempt = attempts, rounds = ?indices, "Rounds refined");

        Ok(NodeResult::update(CurriculumUpdate {
            replaced_rounds: indices
                .into_iter()
                .zip(refined.into_iter().map(|r| r.into_data()))
                .collect(),
            refinement_attempts: Some(attempts),
            quality_phase: Some(gate.phase()),
            ..CurriculumUpdate::default()
        }))
    }
}

/// Recovery node. Keeps whatever was generated and fills gaps without a model.
#[derive(Debug, Default)]
pub struct DegradedFallbackNode;

impl DegradedFallbackNode {
    fn default_plans(state: &CurriculumState) -> Vec<RoundPlan> {
        let skills: Vec<String> = state
            .job
            .as_ref()
            .map(|j| j.skills.clone())
            .unwrap_or_default();
        let generic = ["technical fundamentals", "problem solving", "system design", "collaboration"];
        (0..state.request.effective_round_count())
            .map(|i| {
                let focus = skills
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| generic[i % generic.len()].to_string());
                RoundPlan {
                    title: format!("Round {}", i + 1),
                    focus,
                    duration_minutes: 45,
                    question_count: 1,
                }
            })
            .collect()
    }
}

#[async_trait]
impl Node<CurriculumState> for DegradedFallbackNode {
    fn name(&self) -> &str {
        DEGRADED_FALLBACK
    }

    async fn execute(&self, state: &CurriculumState, ctx: &RunContext) -> NodeOutput {
        let cause = state
            .errors
            .last()
            .map_or_else(|| "unknown failure".to_string(), ToString::to_string);
        warn!(run_id = %ctx.run_id(), cause = %cause, "Degraded fallback engaged");

        let mut update = CurriculumUpdate {
            degraded: Some(true),
            ..CurriculumUpdate::default()
        };
        if state.rounds.is_empty() {
            let plans = state
                .structure
                .as_ref()
                .map_or_else(|| Self::default_plans(state), |s| s.rounds.clone());
            update.rounds = Some(plans.iter().map(InterviewRound::placeholder).collect());
            update
                .warnings
                .push(format!("placeholder rounds synthesised after {cause}"));
        } else {
            update
                .warnings
                .push(format!("generated rounds kept unreviewed after {cause}"));
        }
        Ok(NodeResult::update(update))
    }
}

/// Terminal node. Hands the curriculum to the store.
pub struct PersistNode {
    store: Arc<dyn CurriculumStore>,
}

impl PersistNode {
    /// Creates the node over `store`.
    pub fn new(store: Arc<dyn CurriculumStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Node<CurriculumState> for PersistNode {
    fn name(&self) -> &str {
        PERSIST
    }

    async fn execute(&self, state: &CurriculumState, ctx: &RunContext) -> NodeOutput {
        let phase = if state.quality_phase == QualityPhase::Persisted && !state.degraded {
            QualityPhase::Persisted
        } else {
            QualityPhase::PersistedWithErrors
        };
        let curriculum = Curriculum {
            run_id: ctx.run_id(),
            title: state
                .job
                .as_ref()
                .map_or_else(|| "Interview curriculum".to_string(), |j| j.title.clone()),
            company: state.request.company_name.clone(),
            rounds: state.rounds.clone(),
            quality_score: state.review.as_ref().map(|r| r.score),
            refinement_attempts: state.refinement_attempts,
            best_effort: state.is_best_effort(),
            degraded: state.degraded,
            sources: state
                .company
                .as_ref()
                .map(|c| c.sources.clone())
                .unwrap_or_default(),
            warnings: state.warnings.clone(),
            generated_at: Utc::now(),
        };

        let artifact_id = self.store.persist(&curriculum).await?;
        info!(run_id = %ctx.run_id(), artifact_id = %artifact_id, phase = ?phase, "Curriculum persisted");
        Ok(NodeResult::update(CurriculumUpdate {
            artifact_id: Some(artifact_id),
            quality_phase: Some(phase),
            ..CurriculumUpdate::default()
        }))
    }
}
