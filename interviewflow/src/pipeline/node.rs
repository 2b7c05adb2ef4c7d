//! Node contract.

use super::{CancellationToken, PipelineState};
use crate::errors::NodeError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// What a node returns.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeResult<U> {
    /// Merge and follow the static edge.
    Update(U),
    /// Merge and continue at `next`.
    Goto {
        /// The merge.
        update: U,
        /// Target node name.
        next: String,
    },
}

impl<U> NodeResult<U> {
    /// A plain merge.
    pub fn update(update: U) -> Self {
        Self::Update(update)
    }

    /// A merge with a routing directive.
    pub fn goto(update: U, next: impl Into<String>) -> Self {
        Self::Goto {
            update,
            next: next.into(),
        }
    }

    /// Splits into the merge and the directive target.
    pub fn into_parts(self) -> (U, Option<String>) {
        match self {
            Self::Update(update) => (update, None),
            Self::Goto { update, next } => (update, Some(next)),
        }
    }
}

/// Per-step runtime handed to nodes.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: Uuid,
    step: usize,
    deadline: Option<Instant>,
    cancellation: Arc<CancellationToken>,
}

impl RunContext {
    /// Creates a context.
    #[must_use]
    pub fn new(
        run_id: Uuid,
        step: usize,
        deadline: Option<Instant>,
        cancellation: Arc<CancellationToken>,
    ) -> Self {
        Self {
            run_id,
            step,
            deadline,
            cancellation,
        }
    }

    /// The run identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// One-based index of the current node execution.
    #[must_use]
    pub fn step(&self) -> usize {
        self.step
    }

    /// Time left before the run deadline, if one is set.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Returns true once the run has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// The run's cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancellation
    }
}

/// One step of a pipeline.
///
/// Returning `Err` records the failure in state and routes to the recovery
/// node, unless [`NodeError::is_fatal`] holds, which ends the run.
#[async_trait]
pub trait Node<S: PipelineState>: Send + Sync {
    /// Unique node name.
    fn name(&self) -> &str;

    /// Runs the node against a read-only view of the state.
    async fn execute(&self, state: &S, ctx: &RunContext) -> Result<NodeResult<S::Update>, NodeError>;
}
