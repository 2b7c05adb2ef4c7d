//! Test doubles for the model layer and the curriculum pipeline.

pub mod fixtures;
mod mocks;
mod script;

pub use fixtures::TestScore;
pub use mocks::{MockModelClient, MockOutcome};
pub use script::CurriculumScript;
