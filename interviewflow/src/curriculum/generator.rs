//! End-to-end curriculum generation.

use super::models::{CurriculumArtifact, CurriculumFailure, CurriculumRequest};
use super::nodes::{
    AnalyzeCompanyNode, DegradedFallbackNode, DesignStructureNode, EvaluateQualityNode,
    GenerateRoundsNode, ParseJobNode, PersistNode, RefineRoundsNode, ANALYZE_COMPANY,
    DEGRADED_FALLBACK, DESIGN_STRUCTURE, EVALUATE_QUALITY, GENERATE_ROUNDS, PARSE_JOB, PERSIST,
    REFINE_ROUNDS,
};
use super::state::CurriculumState;
use super::store::CurriculumStore;
use crate::errors::PipelineError;
use crate::events::EventSink;
use crate::llm::LlmService;
use crate::pipeline::{
    GraphBuilder, PipelineEngine, PipelineGraph, PipelineState, RefinementPolicy, RunOptions,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Builds the curriculum graph.
///
/// ```text
/// parse_job -> analyze_company -> design_structure -> generate_rounds -> evaluate_quality
///                                          refine_rounds <-> evaluate_quality -> persist
/// any failure -> degraded_fallback -> persist
/// ```
pub fn curriculum_graph(
    service: Arc<LlmService>,
    store: Arc<dyn CurriculumStore>,
) -> Result<PipelineGraph<CurriculumState>, PipelineError> {
    let refinement = service.config().refinement.clone();
    let policy = RefinementPolicy::new(refinement.quality_threshold, refinement.max_refinement_attempts);

    GraphBuilder::new("curriculum")
        .node(ParseJobNode::new(Arc::clone(&service)))
        .node(AnalyzeCompanyNode::new(Arc::clone(&service)))
        .node(DesignStructureNode::new(Arc::clone(&service)))
        .node(GenerateRoundsNode::new(Arc::clone(&service)))
        .node(RefineRoundsNode::new(
            Arc::clone(&service),
            policy,
            refinement.temperature_boost,
        ))
        .node(EvaluateQualityNode::new(service, policy))
        .node(DegradedFallbackNode)
        .node(PersistNode::new(store))
        .edge(PARSE_JOB, ANALYZE_COMPANY)
        .edge(ANALYZE_COMPANY, DESIGN_STRUCTURE)
        .edge(DESIGN_STRUCTURE, GENERATE_ROUNDS)
        .edge(GENERATE_ROUNDS, EVALUATE_QUALITY)
        .edge(REFINE_ROUNDS, EVALUATE_QUALITY)
        .edge(DEGRADED_FALLBACK, PERSIST)
        .allow_backward(EVALUATE_QUALITY, REFINE_ROUNDS)
        .start(PARSE_JOB)
        .terminal(PERSIST)
        .recovery(DEGRADED_FALLBACK)
        .build()
}

/// Runs the curriculum pipeline and reports an artifact or one failure.
#[derive(Debug)]
pub struct CurriculumGenerator {
    engine: PipelineEngine<CurriculumState>,
}

impl CurriculumGenerator {
    /// Builds the curriculum graph over `service` and `store`.
    pub fn new(service: Arc<LlmService>, store: Arc<dyn CurriculumStore>) -> Result<Self, PipelineError> {
        Ok(Self {
            engine: PipelineEngine::new(curriculum_graph(service, store)?),
        })
    }

    /// Sends pipeline events to `sink`.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.engine = self.engine.with_event_sink(sink);
        self
    }

    /// The underlying engine.
    #[must_use]
    pub fn engine(&self) -> &PipelineEngine<CurriculumState> {
        &self.engine
    }

    /// Runs one generation with default run options.
    pub async fn generate(&self, request: CurriculumRequest) -> Result<CurriculumArtifact, CurriculumFailure> {
        self.generate_with(request, RunOptions::default()).await
    }

    /// Runs one generation.
    ///
    /// An invalid request fails before any provider is called. A run that
    /// ends without an artifact id yields a [`CurriculumFailure`] joining every
    /// recorded error and warning.
    pub async fn generate_with(
        &self,
        request: CurriculumRequest,
        options: RunOptions,
    ) -> Result<CurriculumArtifact, CurriculumFailure> {
        if let Err(reason) = request.validate() {
            return Err(CurriculumFailure::new(None, reason, Vec::new(), Vec::new()));
        }

        match self.engine.run_with(CurriculumState::new(request), options).await {
            Ok(outcome) => {
                let state = outcome.state;
                let Some(artifact_id) = state.artifact_id.clone() else {
                    return Err(CurriculumFailure::new(
                        Some(outcome.run_id),
                        "run finished without an artifact id",
                        state.errors,
                        state.warnings,
                    ));
                };
                info!(
                    run_id = %outcome.run_id,
                    artifact_id = %artifact_id,
                    steps = outcome.visited.len(),
                    errors = state.errors().len(),
                    "Curriculum generated"
                );
                Ok(CurriculumArtifact {
                    artifact_id,
                    run_id: outcome.run_id,
                    quality_score: state.review.as_ref().map(|r| r.score),
                    refinement_attempts: state.refinement_attempts,
                    best_effort: state.is_best_effort(),
                    degraded: state.degraded,
                    errors: state.errors,
                    warnings: state.warnings,
                })
            }
            Err(failure) => {
                warn!(run_id = %failure.run_id, error = %failure.error, "Curriculum generation failed");
                Err(CurriculumFailure::new(
                    Some(failure.run_id),
                    &failure.error,
                    failure.state.errors,
                    failure.state.warnings,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderId;
    use crate::curriculum::models::Curriculum;
    use crate::curriculum::prompts;
    use crate::curriculum::store::{InMemoryCurriculumStore, MockCurriculumStore};
    use crate::errors::StorageError;
    use crate::events::{names, CollectingEventSink};
    use crate::testing::{fixtures, CurriculumScript, MockModelClient, MockOutcome};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::time::Instant;

    struct Harness {
        generator: CurriculumGenerator,
        store: Arc<InMemoryCurriculumStore>,
        sink: Arc<CollectingEventSink>,
    }

    impl Harness {
        fn new(clients: Vec<MockModelClient>) -> Self {
            let service = Arc::new(fixtures::service(clients));
            let store = Arc::new(InMemoryCurriculumStore::new());
            let sink = Arc::new(CollectingEventSink::new());
            let generator = CurriculumGenerator::new(service, store.clone())
                .unwrap()
                .with_event_sink(sink.clone());
            Self { generator, store, sink }
        }

        fn stored(&self, id: &str) -> Curriculum {
            self.store.get(id).unwrap()
        }

        fn visited(&self) -> Vec<String> {
            self.sink
                .find(names::NODE_STARTED)
                .iter()
                .filter_map(|e| e["node"].as_str().map(str::to_string))
                .collect()
        }
    }

    fn request() -> CurriculumRequest {
        CurriculumRequest::new("Senior backend engineer, Rust and Postgres").with_round_count(3)
    }

    fn quality_prompts(client: &MockModelClient) -> usize {
        client
            .prompts()
            .iter()
            .filter(|p| p.starts_with(prompts::QUALITY_REVIEW))
            .count()
    }

    #[test]
    fn test_graph_is_valid() {
        let service = Arc::new(fixtures::service(Vec::new()));
        let graph = curriculum_graph(service, Arc::new(InMemoryCurriculumStore::new())).unwrap();
        assert_eq!(graph.start(), PARSE_JOB);
        assert!(graph.check_route(EVALUATE_QUALITY, REFINE_ROUNDS).is_ok());
        assert!(graph.check_route(REFINE_ROUNDS, GENERATE_ROUNDS).is_err());
        assert_eq!(graph.recovery_for(GENERATE_ROUNDS), Some(DEGRADED_FALLBACK));
    }

    #[tokio::test]
    async fn test_high_score_persists_without_refinement() {
        let openai = CurriculumScript::new([92.0]).client(ProviderId::OpenAi);
        let harness = Harness::new(vec![openai.clone()]);

        let artifact = harness.generator.generate(request()).await.unwrap();
        assert_eq!(artifact.quality_score, Some(92.0));
        assert_eq!(artifact.refinement_attempts, 0);
        assert!(!artifact.best_effort);
        assert!(!artifact.degraded);
        assert!(artifact.errors.is_empty());

        let doc = harness.stored(&artifact.artifact_id);
        assert_eq!(doc.title, "Backend Engineer");
        let titles: Vec<&str> = doc.rounds.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Round 1", "Round 2", "Round 3"]);
        assert_eq!(
            harness.visited(),
            vec![PARSE_JOB, ANALYZE_COMPANY, DESIGN_STRUCTURE, GENERATE_ROUNDS, EVALUATE_QUALITY, PERSIST]
        );
        assert_eq!(quality_prompts(&openai), 1);
    }

    #[tokio::test]
    async fn test_refines_until_threshold() {
        // 60 -> refine, 70 -> refine, 85 -> persist.
        let openai = CurriculumScript::new([60.0, 70.0, 85.0]).client(ProviderId::OpenAi);
        let harness = Harness::new(vec![openai.clone()]);

        let artifact = harness.generator.generate(request()).await.unwrap();
        assert_eq!(artifact.quality_score, Some(85.0));
        assert_eq!(artifact.refinement_attempts, 2);
        assert!(!artifact.best_effort);
        assert_eq!(quality_prompts(&openai), 3);

        let doc = harness.stored(&artifact.artifact_id);
        // Round 0 was flagged in both reviews.
        assert_eq!(doc.rounds[0].title, "Round 1 (refined) (refined)");
        assert_eq!(doc.rounds[1].title, "Round 2");
        assert_eq!(harness.sink.find(names::NODE_ROUTED).len(), 3);
    }

    #[tokio::test]
    async fn test_ceiling_persists_best_effort() {
        let openai = CurriculumScript::new([40.0]).client(ProviderId::OpenAi);
        let harness = Harness::new(vec![openai.clone()]);

        let artifact = harness.generator.generate(request()).await.unwrap();
        assert!(artifact.best_effort);
        assert_eq!(artifact.refinement_attempts, 2);
        assert_eq!(quality_prompts(&openai), 3);
        assert!(artifact.warnings.iter().any(|w| w.contains("best effort")));
        assert!(harness.stored(&artifact.artifact_id).best_effort);
    }

    #[tokio::test]
    async fn test_refinement_runs_hotter() {
        let openai = CurriculumScript::new([50.0, 95.0]).client(ProviderId::OpenAi);
        let harness = Harness::new(vec![openai.clone()]);
        harness.generator.generate(request()).await.unwrap();

        let refinement = openai
            .requests()
            .into_iter()
            .find(|r| r.prompt.starts_with(prompts::ROUND_REFINEMENT))
            .unwrap();
        // Refinement task temperature 0.8 plus the 0.2 boost.
        assert!((refinement.temperature - 1.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overloaded_primary_falls_back_without_delay() {
        let script = CurriculumScript::new([90.0]);
        let anthropic = MockModelClient::new(ProviderId::Anthropic).with_default(MockOutcome::Overloaded);
        let openai = script.client(ProviderId::OpenAi);
        let harness = Harness::new(vec![anthropic.clone(), openai]);

        let started = Instant::now();
        let artifact = harness.generator.generate(request()).await.unwrap();
        assert!(started.elapsed() < fixtures::TEST_BACKOFF);
        assert!(artifact.errors.is_empty());
        // Structure design and the round batch both tried anthropic first.
        assert!(anthropic.call_count() >= 2);
    }

    #[tokio::test]
    async fn test_failed_round_generation_degrades() {
        let openai = CurriculumScript::new([90.0])
            .failing(prompts::INTERVIEW_ROUND)
            .client(ProviderId::OpenAi);
        let harness = Harness::new(vec![openai]);

        let artifact = harness.generator.generate(request()).await.unwrap();
        assert!(artifact.degraded);
        assert_eq!(artifact.errors.len(), 1);
        assert_eq!(artifact.errors[0].source, GENERATE_ROUNDS);
        assert!(artifact.errors[0].message.contains("all providers exhausted"));

        let doc = harness.stored(&artifact.artifact_id);
        assert_eq!(doc.rounds.len(), 3);
        assert!(doc.rounds.iter().all(|r| r.placeholder));
        assert_eq!(
            harness.visited(),
            vec![PARSE_JOB, ANALYZE_COMPANY, DESIGN_STRUCTURE, GENERATE_ROUNDS, DEGRADED_FALLBACK, PERSIST]
        );
    }

    #[tokio::test]
    async fn test_failed_evaluation_keeps_generated_rounds() {
        let openai = CurriculumScript::new([90.0])
            .failing(prompts::QUALITY_REVIEW)
            .client(ProviderId::OpenAi);
        let harness = Harness::new(vec![openai]);

        let artifact = harness.generator.generate(request()).await.unwrap();
        assert!(artifact.degraded);
        assert_eq!(artifact.quality_score, None);
        let doc = harness.stored(&artifact.artifact_id);
        assert!(doc.rounds.iter().all(|r| !r.placeholder));
    }

    #[tokio::test]
    async fn test_no_providers_degrades_without_calls() {
        let harness = Harness::new(Vec::new());

        let artifact = harness.generator.generate(request()).await.unwrap();
        assert!(artifact.degraded);
        assert_eq!(artifact.errors[0].source, PARSE_JOB);
        assert!(artifact.errors[0].message.contains("unavailable"));
        assert_eq!(harness.stored(&artifact.artifact_id).rounds.len(), 3);
    }

    #[tokio::test]
    async fn test_company_context_carries_citations() {
        let script = CurriculumScript::new([90.0]).with_citations(&["https://acme.example/about"]);
        let harness = Harness::new(vec![
            script.client(ProviderId::OpenAi),
            script.client(ProviderId::Gemini),
        ]);

        let artifact = harness
            .generator
            .generate(request().with_company("Acme"))
            .await
            .unwrap();
        let doc = harness.stored(&artifact.artifact_id);
        assert_eq!(doc.company.as_deref(), Some("Acme"));
        assert_eq!(doc.sources, vec!["https://acme.example/about"]);
    }

    #[tokio::test]
    async fn test_company_failure_is_a_warning() {
        let openai = CurriculumScript::new([90.0])
            .failing(prompts::COMPANY_ANALYSIS)
            .client(ProviderId::OpenAi);
        let harness = Harness::new(vec![openai]);

        let artifact = harness
            .generator
            .generate(request().with_company("Acme"))
            .await
            .unwrap();
        assert!(!artifact.degraded);
        assert!(artifact.errors.is_empty());
        assert!(artifact.warnings.iter().any(|w| w.contains("company analysis for 'Acme' skipped")));
    }

    #[tokio::test]
    async fn test_storage_failure_is_fatal() {
        let openai = CurriculumScript::new([40.0]).client(ProviderId::OpenAi);
        let service = Arc::new(fixtures::service(vec![openai]));
        let mut store = MockCurriculumStore::new();
        store
            .expect_persist()
            .times(1)
            .returning(|_| Err(StorageError::Backend("disk full".to_string())));
        let generator = CurriculumGenerator::new(service, Arc::new(store)).unwrap();

        let failure = generator.generate(request()).await.unwrap_err();
        assert!(failure.run_id.is_some());
        assert!(failure.message.contains("disk full"), "{}", failure.message);
        assert!(failure.message.contains("best effort"), "{}", failure.message);
    }

    #[tokio::test]
    async fn test_invalid_request_never_calls_providers() {
        let openai = CurriculumScript::new([90.0]).client(ProviderId::OpenAi);
        let harness = Harness::new(vec![openai.clone()]);

        let failure = harness.generator.generate(CurriculumRequest::new("   ")).await.unwrap_err();
        assert_eq!(failure.message, "curriculum generation failed: job description is empty");
        assert_eq!(openai.call_count(), 0);
        assert!(harness.sink.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_surfaces_partial_state() {
        let openai = CurriculumScript::new([90.0])
            .client(ProviderId::OpenAi)
            .with_latency(Duration::from_secs(10));
        let harness = Harness::new(vec![openai]);

        let failure = harness
            .generator
            .generate_with(request(), RunOptions::new().with_deadline(Duration::from_secs(15)))
            .await
            .unwrap_err();
        assert!(failure.message.contains("deadline exceeded"), "{}", failure.message);
    }
}
