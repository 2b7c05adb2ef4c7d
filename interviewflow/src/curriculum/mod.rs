//! Interview curriculum generation.
//!
//! The pipeline parses the job description, optionally analyses the company,
//! plans rounds, generates them in one batch, and loops through a bounded
//! quality gate before handing the result to a [`CurriculumStore`]. Any node
//! failure routes to a degraded fallback that still persists a usable
//! curriculum; only a storage failure ends the run without an artifact.

mod generator;
mod models;
mod nodes;
pub mod prompts;
mod state;
mod store;

pub use generator::{curriculum_graph, CurriculumGenerator};
pub use models::{
    CompanyContext, Curriculum, CurriculumArtifact, CurriculumFailure, CurriculumRequest,
    InterviewRound, InterviewStructure, ParsedJob, QualityReview, Question, RoundPlan,
    DEFAULT_ROUND_COUNT, MAX_ROUNDS,
};
pub use nodes::{
    AnalyzeCompanyNode, DegradedFallbackNode, DesignStructureNode, EvaluateQualityNode,
    GenerateRoundsNode, ParseJobNode, PersistNode, RefineRoundsNode, ANALYZE_COMPANY,
    DEGRADED_FALLBACK, DESIGN_STRUCTURE, EVALUATE_QUALITY, GENERATE_ROUNDS, PARSE_JOB, PERSIST,
    REFINE_ROUNDS,
};
pub use state::{CurriculumState, CurriculumUpdate};
pub use store::{CurriculumStore, InMemoryCurriculumStore, JsonFileCurriculumStore};
