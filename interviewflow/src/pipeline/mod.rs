//! Typed pipeline engine.
//!
//! A pipeline is a graph of named [`Node`]s over a [`PipelineState`]. Each
//! node returns a merge, optionally with a routing directive that overrides
//! the static edge. The engine drives execution from the start node to a
//! terminal node, one node at a time.

mod cancellation;
mod engine;
mod graph;
mod node;
mod refinement;
mod state;

#[cfg(test)]
mod integration_tests;

pub use cancellation::CancellationToken;
pub use engine::{PipelineEngine, RunFailure, RunOptions, RunOutcome};
pub use graph::{GraphBuilder, PipelineGraph};
pub use node::{Node, NodeResult, RunContext};
pub use refinement::{
    QualityDecision, QualityLoop, QualityPhase, RefinementPolicy, TransitionError,
};
pub use state::PipelineState;
