//! Sequential pipeline execution.

use super::{CancellationToken, NodeResult, PipelineGraph, PipelineState, RunContext};
use crate::errors::{ErrorRecord, NodeError, PipelineError};
use crate::events::{names, EventSink, NoOpEventSink};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default ceiling on node executions per run.
pub const DEFAULT_MAX_STEPS: usize = 64;

/// Run-level limits.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Run identifier; generated when absent.
    pub run_id: Option<Uuid>,
    /// Wall-clock budget for the whole run.
    pub deadline: Option<Duration>,
    /// External cancellation.
    pub cancellation: Option<Arc<CancellationToken>>,
    /// Ceiling on node executions.
    pub max_steps: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            run_id: None,
            deadline: None,
            cancellation: None,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

impl RunOptions {
    /// Default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the run identifier.
    #[must_use]
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Sets the wall-clock budget.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Sets the step ceiling.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }
}

/// A run that reached a terminal node.
#[derive(Debug)]
pub struct RunOutcome<S> {
    /// Run identifier.
    pub run_id: Uuid,
    /// Final state.
    pub state: S,
    /// Node names in execution order.
    pub visited: Vec<String>,
    /// Wall-clock duration.
    pub duration_ms: u64,
}

impl<S> RunOutcome<S> {
    /// Number of node executions.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.visited.len()
    }
}

/// A run that ended on a fatal error. The accumulated state is preserved.
#[derive(Debug)]
pub struct RunFailure<S> {
    /// Run identifier.
    pub run_id: Uuid,
    /// The fatal error.
    pub error: PipelineError,
    /// State at the point of failure.
    pub state: S,
    /// Node names in execution order.
    pub visited: Vec<String>,
}

impl<S> std::fmt::Display for RunFailure<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run {} failed: {}", self.run_id, self.error)
    }
}

impl<S: std::fmt::Debug> std::error::Error for RunFailure<S> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

enum StepOutcome<U> {
    Finished(Result<NodeResult<U>, NodeError>),
    DeadlineExceeded,
    Cancelled,
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Drives a [`PipelineGraph`] from its start node to a terminal node.
///
/// Nodes run strictly one at a time. A node's merge is applied before the
/// next node starts.
pub struct PipelineEngine<S: PipelineState> {
    graph: Arc<PipelineGraph<S>>,
    sink: Arc<dyn EventSink>,
}

impl<S: PipelineState> PipelineEngine<S> {
    /// Creates an engine with no event sink.
    #[must_use]
    pub fn new(graph: PipelineGraph<S>) -> Self {
        Self {
            graph: Arc::new(graph),
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// The graph.
    #[must_use]
    pub fn graph(&self) -> &PipelineGraph<S> {
        &self.graph
    }

    /// Runs with default limits.
    pub async fn run(&self, initial: S) -> Result<RunOutcome<S>, RunFailure<S>> {
        self.run_with(initial, RunOptions::default()).await
    }

    /// Runs with explicit limits.
    pub async fn run_with(&self, initial: S, options: RunOptions) -> Result<RunOutcome<S>, RunFailure<S>> {
        let run_id = options.run_id.unwrap_or_else(Uuid::now_v7);
        let started = Instant::now();
        let deadline = options.deadline.map(|d| started + d);
        let token = options.cancellation.unwrap_or_default();
        let graph = &self.graph;

        let mut state = initial;
        let mut visited: Vec<String> = Vec::new();
        let mut current = graph.start().to_string();

        info!(run_id = %run_id, pipeline = graph.name(), "Pipeline started");
        self.sink
            .emit(
                names::PIPELINE_STARTED,
                Some(json!({ "run_id": run_id, "pipeline": graph.name() })),
            )
            .await;

        let error = loop {
            if token.is_cancelled() {
                break Some(PipelineError::Cancelled {
                    reason: token.reason().unwrap_or_default(),
                });
            }
            if visited.len() >= options.max_steps {
                break Some(PipelineError::StepLimitExceeded {
                    limit: options.max_steps,
                });
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break Some(PipelineError::DeadlineExceeded { node: current });
            }
            let Some(node) = graph.node(&current) else {
                break Some(PipelineError::UnknownNode {
                    from: visited.last().cloned().unwrap_or_default(),
                    target: current,
                });
            };

            visited.push(current.clone());
            let step = visited.len();
            let ctx = RunContext::new(run_id, step, deadline, Arc::clone(&token));
            debug!(run_id = %run_id, node = %current, step, "Node started");
            self.sink.try_emit(
                names::NODE_STARTED,
                Some(json!({ "run_id": run_id, "node": current, "step": step })),
            );

            let outcome = tokio::select! {
                biased;
                () = token.cancelled() => StepOutcome::Cancelled,
                () = wait_until(deadline) => StepOutcome::DeadlineExceeded,
                result = node.execute(&state, &ctx) => StepOutcome::Finished(result),
            };

            let next = match outcome {
                StepOutcome::Cancelled => {
                    break Some(PipelineError::Cancelled {
                        reason: token.reason().unwrap_or_default(),
                    });
                }
                StepOutcome::DeadlineExceeded => {
                    break Some(PipelineError::DeadlineExceeded { node: current });
                }
                StepOutcome::Finished(Ok(result)) => {
                    let (update, directive) = result.into_parts();
                    state.apply(update);
                    if graph.is_terminal(&current) {
                        self.sink.try_emit(
                            names::NODE_COMPLETED,
                            Some(json!({ "run_id": run_id, "node": current })),
                        );
                        break None;
                    }
                    match self.route(run_id, &current, directive) {
                        Ok(next) => next,
                        Err(e) => break Some(e),
                    }
                }
                StepOutcome::Finished(Err(e)) if e.is_fatal() => {
                    break Some(PipelineError::NodeFatal {
                        node: current,
                        source: e,
                    });
                }
                StepOutcome::Finished(Err(e)) => {
                    let message = e.to_string();
                    warn!(run_id = %run_id, node = %current, error = %message, "Node failed");
                    state.record_error(ErrorRecord::new(current.as_str(), message.as_str()));
                    self.sink.try_emit(
                        names::NODE_FAILED,
                        Some(json!({ "run_id": run_id, "node": current, "error": message })),
                    );
                    match graph.recovery_for(&current) {
                        Some(recovery) => recovery.to_string(),
                        None => {
                            break Some(PipelineError::Unrecovered {
                                node: current,
                                message,
                            });
                        }
                    }
                }
            };
            current = next;
        };

        match error {
            None => {
                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                info!(
                    run_id = %run_id,
                    steps = visited.len(),
                    errors = state.errors().len(),
                    warnings = state.warnings().len(),
                    duration_ms,
                    "Pipeline completed"
                );
                self.sink
                    .emit(
                        names::PIPELINE_COMPLETED,
                        Some(json!({
                            "run_id": run_id,
                            "steps": visited.len(),
                            "errors": state.errors().len(),
                            "duration_ms": duration_ms,
                        })),
                    )
                    .await;
                Ok(RunOutcome {
                    run_id,
                    state,
                    visited,
                    duration_ms,
                })
            }
            Some(error) => self.fail(run_id, error, state, visited).await,
        }
    }

    /// Resolves the successor of a node that finished without error.
    fn route(&self, run_id: Uuid, current: &str, directive: Option<String>) -> Result<String, PipelineError> {
        match directive {
            Some(target) => {
                self.graph.check_route(current, &target)?;
                debug!(run_id = %run_id, node = %current, target = %target, "Node routed");
                self.sink.try_emit(
                    names::NODE_ROUTED,
                    Some(json!({ "run_id": run_id, "node": current, "target": target })),
                );
                Ok(target)
            }
            None => {
                self.sink.try_emit(
                    names::NODE_COMPLETED,
                    Some(json!({ "run_id": run_id, "node": current })),
                );
                self.graph
                    .edge(current)
                    .map(str::to_string)
                    .ok_or_else(|| PipelineError::MissingEdge {
                        node: current.to_string(),
                    })
            }
        }
    }

    async fn fail(
        &self,
        run_id: Uuid,
        error: PipelineError,
        state: S,
        visited: Vec<String>,
    ) -> Result<RunOutcome<S>, RunFailure<S>> {
        warn!(run_id = %run_id, error = %error, "Pipeline failed");
        self.sink
            .emit(
                names::PIPELINE_FAILED,
                Some(json!({ "run_id": run_id, "error": error.to_string(), "visited": visited })),
            )
            .await;
        Err(RunFailure {
            run_id,
            error,
            state,
            visited,
        })
    }
}

impl<S: PipelineState> std::fmt::Debug for PipelineEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineEngine")
            .field("graph", &self.graph)
            .finish_non_exhaustive()
    }
}
