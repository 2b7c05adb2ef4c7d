//! Accumulating pipeline state.

use crate::errors::ErrorRecord;

/// State threaded through a pipeline run.
///
/// Merges may overwrite fields but must append errors and warnings, never
/// replace them.
pub trait PipelineState: Send + Sync + 'static {
    /// Partial update returned by nodes.
    type Update: Default + Send + 'static;

    /// Merges an update.
    fn apply(&mut self, update: Self::Update);

    /// Appends a node failure.
    fn record_error(&mut self, error: ErrorRecord);

    /// Every recorded error, oldest first.
    fn errors(&self) -> &[ErrorRecord];

    /// Every recorded warning, oldest first.
    fn warnings(&self) -> &[String];
}
