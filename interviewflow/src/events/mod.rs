//! Run lifecycle events.
//!
//! The engine reports progress through an injected [`EventSink`]. There is
//! no global sink; a run without one uses [`NoOpEventSink`].

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event names emitted by the pipeline engine.
pub mod names {
    /// A run began.
    pub const PIPELINE_STARTED: &str = "pipeline.started";
    /// A run reached its terminal node.
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
    /// A run ended with a fatal error.
    pub const PIPELINE_FAILED: &str = "pipeline.failed";
    /// A node is about to execute.
    pub const NODE_STARTED: &str = "node.started";
    /// A node returned a merge.
    pub const NODE_COMPLETED: &str = "node.completed";
    /// A node failed; the error was recorded.
    pub const NODE_FAILED: &str = "node.failed";
    /// A node returned a routing directive.
    pub const NODE_ROUTED: &str = "node.routed";
}
