//! Engine integration tests over a toy state.

/// Toy state and nodes shared by the pipeline unit tests.
pub(crate) mod support {
    use crate::errors::{ErrorRecord, NodeError};
    use crate::pipeline::{GraphBuilder, Node, NodeResult, PipelineState, RunContext};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct Toy {
        pub trail: Vec<String>,
        pub counter: u32,
        pub errors: Vec<ErrorRecord>,
        pub warnings: Vec<String>,
    }

    #[derive(Debug, Default)]
    pub struct ToyUpdate {
        pub visit: Option<String>,
        pub counter: Option<u32>,
        pub warnings: Vec<String>,
    }

    impl PipelineState for Toy {
        type Update = ToyUpdate;

        fn apply(&mut self, update: ToyUpdate) {
            if let Some(visit) = update.visit {
                self.trail.push(visit);
            }
            if let Some(counter) = update.counter {
                self.counter = counter;
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

    pub type Behaviour = Arc<dyn Fn(&Toy) -> Result<NodeResult<ToyUpdate>, NodeError> + Send + Sync>;

    /// Records its name, then applies an optional behaviour.
    pub struct Step {
        name: String,
        behaviour: Option<Behaviour>,
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    impl Step {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                behaviour: None,
                delay: Duration::ZERO,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn with<F>(mut self, behaviour: F) -> Self
        where
            F: Fn(&Toy) -> Result<NodeResult<ToyUpdate>, NodeError> + Send + Sync + 'static,
        {
            self.behaviour = Some(Arc::new(behaviour));
            self
        }

        pub fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn calls(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.calls)
        }
    }

    #[async_trait]
    impl Node<Toy> for Step {
        fn name(&self) -> &str {
            &self.name
        }

        async fn execute(&self, state: &Toy, _ctx: &RunContext) -> Result<NodeResult<ToyUpdate>, NodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let result = match &self.behaviour {
                Some(behaviour) => behaviour(state)?,
                None => NodeResult::update(ToyUpdate::default()),
            };
            let (mut update, next) = result.into_parts();
            update.visit = Some(self.name.clone());
            Ok(match next {
                Some(next) => NodeResult::goto(update, next),
                None => NodeResult::update(update),
            })
        }
    }

    pub fn graph_error(builder: GraphBuilder<Toy>) -> String {
        builder.build().map(|_| ()).unwrap_err().to_string()
    }
}

mod tests {
    use super::support::{Step, Toy, ToyUpdate};
    use crate::errors::{NodeError, PipelineError, StorageError};
    use crate::events::{names, CollectingEventSink};
    use crate::pipeline::{
        CancellationToken, GraphBuilder, NodeResult, PipelineEngine, PipelineState, RunOptions,
    };
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    fn linear() -> GraphBuilder<Toy> {
        GraphBuilder::new("linear")
            .node(Step::new("a"))
            .node(Step::new("b"))
            .node(Step::new("c"))
            .edge("a", "b")
            .edge("b", "c")
            .start("a")
            .terminal("c")
    }

    #[tokio::test]
    async fn test_linear_run_follows_static_edges() {
        let sink = Arc::new(CollectingEventSink::new());
        let engine = PipelineEngine::new(linear().build().unwrap()).with_event_sink(sink.clone());

        let outcome = engine.run(Toy::default()).await.unwrap();
        assert_eq!(outcome.state.trail, vec!["a", "b", "c"]);
        assert_eq!(outcome.visited, vec!["a", "b", "c"]);
        assert_eq!(outcome.steps(), 3);

        let events = sink.event_types();
        assert_eq!(events.first().map(String::as_str), Some(names::PIPELINE_STARTED));
        assert_eq!(events.last().map(String::as_str), Some(names::PIPELINE_COMPLETED));
        assert_eq!(sink.find(names::NODE_STARTED).len(), 3);
    }

    #[tokio::test]
    async fn test_directive_overrides_static_edge() {
        let graph = GraphBuilder::new("skip")
            .node(Step::new("a").with(|_| Ok(NodeResult::goto(ToyUpdate::default(), "c"))))
            .node(Step::new("b"))
            .node(Step::new("c"))
            .edge("a", "b")
            .edge("b", "c")
            .start("a")
            .terminal("c")
            .build()
            .unwrap();

        let outcome = PipelineEngine::new(graph).run(Toy::default()).await.unwrap();
        assert_eq!(outcome.visited, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_unknown_directive_target_is_fatal() {
        let graph = GraphBuilder::new("bad")
            .node(Step::new("a").with(|_| Ok(NodeResult::goto(ToyUpdate::default(), "nowhere"))))
            .node(Step::new("b"))
            .edge("a", "b")
            .start("a")
            .terminal("b")
            .build()
            .unwrap();

        let failure = PipelineEngine::new(graph).run(Toy::default()).await.unwrap_err();
        assert!(matches!(failure.error, PipelineError::UnknownNode { ref target, .. } if target == "nowhere"));
        // The merge that carried the bad directive was applied.
        assert_eq!(failure.state.trail, vec!["a"]);
    }

    #[tokio::test]
    async fn test_backward_route_requires_permission() {
        let graph = GraphBuilder::new("loop")
            .node(Step::new("a"))
            .node(Step::new("b").with(|_| Ok(NodeResult::goto(ToyUpdate::default(), "a"))))
            .node(Step::new("c"))
            .edge("a", "b")
            .edge("b", "c")
            .start("a")
            .terminal("c")
            .build()
            .unwrap();

        let failure = PipelineEngine::new(graph).run(Toy::default()).await.unwrap_err();
        assert!(matches!(failure.error, PipelineError::IllegalBackwardRoute { .. }));
    }

    #[tokio::test]
    async fn test_bounded_loop_between_gate_and_worker() {
        // "gate" loops back to "work" until the counter reaches 2.
        let graph = GraphBuilder::new("gate")
            .node(Step::new("start"))
            .node(Step::new("work").with(|s| {
                Ok(NodeResult::update(ToyUpdate {
                    counter: Some(s.counter + 1),
                    ..ToyUpdate::default()
                }))
            }))
            .node(Step::new("gate").with(|s| {
                let next = if s.counter >= 2 { "done" } else { "work" };
                Ok(NodeResult::goto(ToyUpdate::default(), next))
            }))
            .node(Step::new("done"))
            .edge("start", "gate")
            .edge("work", "gate")
            .allow_backward("gate", "work")
            .start("start")
            .terminal("done")
            .build()
            .unwrap();

        let outcome = PipelineEngine::new(graph).run(Toy::default()).await.unwrap();
        assert_eq!(
            outcome.visited,
            vec!["start", "gate", "work", "gate", "work", "gate", "done"]
        );
        assert_eq!(outcome.state.counter, 2);
    }

    #[tokio::test]
    async fn test_step_limit_stops_runaway_loops() {
        let graph = GraphBuilder::new("forever")
            .node(Step::new("a"))
            .node(Step::new("gate").with(|_| Ok(NodeResult::goto(ToyUpdate::default(), "a"))))
            .node(Step::new("end"))
            .edge("a", "gate")
            .allow_backward("gate", "a")
            .start("a")
            .terminal("end")
            .build()
            .unwrap();

        let failure = PipelineEngine::new(graph)
            .run_with(Toy::default(), RunOptions::new().with_max_steps(10))
            .await
            .unwrap_err();
        assert!(matches!(failure.error, PipelineError::StepLimitExceeded { limit: 10 }));
        assert_eq!(failure.visited.len(), 10);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_routed_to_recovery() {
        let graph = GraphBuilder::new("recover")
            .node(Step::new("a").with(|_| Err(NodeError::recoverable("boom"))))
            .node(Step::new("b"))
            .node(Step::new("fallback").with(|_| {
                Ok(NodeResult::update(ToyUpdate {
                    warnings: vec!["degraded".to_string()],
                    ..ToyUpdate::default()
                }))
            }))
            .node(Step::new("end"))
            .edge("a", "b")
            .edge("b", "end")
            .edge("fallback", "end")
            .start("a")
            .terminal("end")
            .recovery("fallback")
            .build()
            .unwrap();

        let sink = Arc::new(CollectingEventSink::new());
        let outcome = PipelineEngine::new(graph)
            .with_event_sink(sink.clone())
            .run(Toy::default())
            .await
            .unwrap();
        assert_eq!(outcome.visited, vec!["a", "fallback", "end"]);
        assert_eq!(outcome.state.errors().len(), 1);
        assert_eq!(outcome.state.errors()[0].source, "a");
        assert_eq!(outcome.state.errors()[0].message, "boom");
        assert_eq!(outcome.state.warnings, vec!["degraded".to_string()]);
        assert_eq!(sink.find(names::NODE_FAILED).len(), 1);
    }

    #[tokio::test]
    async fn test_failure_without_recovery_surfaces_state() {
        let graph = GraphBuilder::new("no-recovery")
            .node(Step::new("a").with(|_| Err(NodeError::recoverable("boom"))))
            .node(Step::new("b"))
            .edge("a", "b")
            .start("a")
            .terminal("b")
            .build()
            .unwrap();

        let failure = PipelineEngine::new(graph).run(Toy::default()).await.unwrap_err();
        assert!(matches!(failure.error, PipelineError::Unrecovered { ref node, .. } if node == "a"));
        assert_eq!(failure.state.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_fatal_errors_skip_recovery() {
        let graph = GraphBuilder::new("fatal")
            .node(Step::new("a"))
            .node(Step::new("fallback"))
            .node(Step::new("persist").with(|_| {
                Err(NodeError::Storage(StorageError::Backend("disk full".to_string())))
            }))
            .edge("a", "persist")
            .edge("fallback", "persist")
            .start("a")
            .terminal("persist")
            .recovery("fallback")
            .build()
            .unwrap();

        let failure = PipelineEngine::new(graph).run(Toy::default()).await.unwrap_err();
        match failure.error {
            PipelineError::NodeFatal { node, source } => {
                assert_eq!(node, "persist");
                assert!(matches!(source, NodeError::Storage(StorageError::Backend(_))));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_recovery_node_failure_is_unrecovered() {
        let graph = GraphBuilder::new("double")
            .node(Step::new("a").with(|_| Err(NodeError::recoverable("first"))))
            .node(Step::new("fallback").with(|_| Err(NodeError::recoverable("second"))))
            .node(Step::new("end"))
            .edge("a", "end")
            .edge("fallback", "end")
            .start("a")
            .terminal("end")
            .recovery("fallback")
            .build()
            .unwrap();

        let failure = PipelineEngine::new(graph).run(Toy::default()).await.unwrap_err();
        assert!(matches!(failure.error, PipelineError::Unrecovered { ref node, .. } if node == "fallback"));
        let sources: Vec<&str> = failure.state.errors.iter().map(|e| e.source.as_str()).collect();
        assert_eq!(sources, vec!["a", "fallback"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_slow_node() {
        let slow = Step::new("b").slow(Duration::from_secs(30));
        let graph = GraphBuilder::new("slow")
            .node(Step::new("a"))
            .node(slow)
            .node(Step::new("c"))
            .edge("a", "b")
            .edge("b", "c")
            .start("a")
            .terminal("c")
            .build()
            .unwrap();

        let failure = PipelineEngine::new(graph)
            .run_with(Toy::default(), RunOptions::new().with_deadline(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(failure.error, PipelineError::DeadlineExceeded { ref node } if node == "b"));
        assert_eq!(failure.state.trail, vec!["a"]);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_running_node() {
        let token = Arc::new(CancellationToken::new());
        let slow = Step::new("b").slow(Duration::from_secs(30));
        let calls = slow.calls();
        let graph = GraphBuilder::new("cancel")
            .node(Step::new("a"))
            .node(slow)
            .node(Step::new("c"))
            .edge("a", "b")
            .edge("b", "c")
            .start("a")
            .terminal("c")
            .build()
            .unwrap();

        let canceller = {
            let token = Arc::clone(&token);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                token.cancel("user aborted");
            })
        };
        let failure = PipelineEngine::new(graph)
            .run_with(Toy::default(), RunOptions::new().with_cancellation(token))
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(failure.error, PipelineError::Cancelled { ref reason } if reason == "user aborted"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pre_cancelled_run_executes_nothing() {
        let token = Arc::new(CancellationToken::new());
        token.cancel("shutdown");
        let failure = PipelineEngine::new(linear().build().unwrap())
            .run_with(Toy::default(), RunOptions::new().with_cancellation(token))
            .await
            .unwrap_err();
        assert!(failure.visited.is_empty());
        assert!(failure.to_string().contains("shutdown"));
    }
}
