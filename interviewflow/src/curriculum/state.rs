//! Curriculum pipeline state.

use super::models::{
    CompanyContext, CurriculumRequest, InterviewRound, InterviewStructure, ParsedJob,
    QualityReview,
};
use crate::errors::ErrorRecord;
use crate::pipeline::{PipelineState, QualityPhase};

/// Everything accumulated during one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurriculumState {
    /// The request being served.
    pub request: CurriculumRequest,
    /// Parsed job profile.
    pub job: Option<ParsedJob>,
    /// Company context, when a company was named and analysis succeeded.
    pub company: Option<CompanyContext>,
    /// Planned rounds.
    pub structure: Option<InterviewStructure>,
    /// Generated rounds, in plan order.
    pub rounds: Vec<InterviewRound>,
    /// Most recent quality review.
    pub review: Option<QualityReview>,
    /// Where the quality loop stands.
    pub quality_phase: QualityPhase,
    /// Refinement passes made so far. Never decreases.
    pub refinement_attempts: u32,
    /// Set once the degraded fallback has run.
    pub degraded: bool,
    /// Id from the store, once persisted.
    pub artifact_id: Option<String>,
    /// Recovered node failures.
    pub errors: Vec<ErrorRecord>,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
}

impl CurriculumState {
    /// Fresh state for `request`.
    #[must_use]
    pub fn new(request: CurriculumRequest) -> Self {
        Self {
            request,
            ..Self::default()
        }
    }

    /// Returns true if the quality gate gave up before the threshold.
    #[must_use]
    pub fn is_best_effort(&self) -> bool {
        self.quality_phase == QualityPhase::PersistedWithErrors
    }
}

/// Partial update returned by curriculum nodes.
///
/// `None` leaves a field untouched. `replaced_rounds` swaps individual rounds
/// by index; warnings are appended.
#[derive(Debug, Default)]
pub struct CurriculumUpdate {
    /// New job profile.
    pub job: Option<ParsedJob>,
    /// New company context.
    pub company: Option<CompanyContext>,
    /// New structure.
    pub structure: Option<InterviewStructure>,
    /// Replaces every round.
    pub rounds: Option<Vec<InterviewRound>>,
    /// Replaces single rounds by index. Out-of-range indices are ignored.
    pub replaced_rounds: Vec<(usize, InterviewRound)>,
    /// New quality review.
    pub review: Option<QualityReview>,
    /// New quality phase.
    pub quality_phase: Option<QualityPhase>,
    /// Attempt count, merged with `max`.
    pub refinement_attempts: Option<u32>,
    /// Degraded flag.
    pub degraded: Option<bool>,
    /// Stored artifact id.
    pub artifact_id: Option<String>,
    /// Warnings to append.
    pub warnings: Vec<String>,
}

impl CurriculumUpdate {
    /// An update carrying only `message` as a warning.
    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            warnings: vec![message.into()],
            ..Self::default()
        }
    }
}

impl PipelineState for CurriculumState {
    type Update = CurriculumUpdate;

    fn apply(&mut self, update: CurriculumUpdate) {
        if let Some(job) = update.job {
            self.job = Some(job);
        }
        if let Some(company) = update.company {
            self.company = Some(company);
        }
        if let Some(structure) = update.structure {
            self.structure = Some(structure);
        }
        if let Some(rounds) = update.rounds {
            self.rounds = rounds;
        }
        for (index, round) in update.replaced_rounds {
            if let Some(slot) = self.rounds.get_mut(index) {
                *slot = round;
            }
        }
        if let Some(review) = update.review {
            self.review = Some(review);
        }
        if let Some(phase) = update.quality_phase {
            self.quality_phase = phase;
        }
        if let Some(attempts) = update.refinement_attempts {
            // The counter never moves backward.
            self.refinement_attempts = self.refinement_attempts.max(attempts);
        }
        if let Some(degraded) = update.degraded {
            self.degraded = degraded;
        }
        if let Some(id) = update.artifact_id {
            self.artifact_id = Some(id);
        }
        self.warnings.extend(update.warnings);
    }

    fn record_error(&mut self, error: ErrorRecord) {
        self.errors.push(error);
    }

    fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    fn warnings(&self) -> &[String] {
        &self.warnings
    }
}
