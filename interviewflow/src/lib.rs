//! # Interviewflow
//!
//! Resilient generation of interview curricula over unreliable model
//! providers.
//!
//! The crate has two halves:
//!
//! - **Model layer** ([`llm`], [`providers`]): provider registry, sliding-window
//!   rate limiting, response caching, schema-validated structured output,
//!   ordered fallback and all-or-nothing batch fan-out.
//! - **Pipeline layer** ([`pipeline`], [`curriculum`]): a typed graph engine
//!   with routing directives, failure recovery and a bounded quality loop,
//!   plus the curriculum nodes built on it.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use interviewflow::prelude::*;
//!
//! let service = Arc::new(LlmService::from_env(LlmConfig::default())?);
//! let store = Arc::new(JsonFileCurriculumStore::new("artifacts"));
//! let generator = CurriculumGenerator::new(service, store)?;
//!
//! let artifact = generator
//!     .generate(CurriculumRequest::new(job_description).with_company("Acme"))
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod curriculum;
pub mod errors;
pub mod events;
pub mod llm;
pub mod observability;
pub mod pipeline;
pub mod providers;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Credentials, LlmConfig, ProviderId, TaskConfig, TaskName};
    pub use crate::curriculum::{
        CurriculumArtifact, CurriculumFailure, CurriculumGenerator, CurriculumRequest,
        CurriculumStore, InMemoryCurriculumStore, JsonFileCurriculumStore,
    };
    pub use crate::errors::{
        ConfigError, InterviewflowError, LlmError, NodeError, PipelineError, StorageError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::llm::{
        GenerationOptions, GenerationResult, JsonSchema, LlmService, ResponseSchema,
        StructuredResponse, Validate,
    };
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        CancellationToken, GraphBuilder, Node, NodeResult, PipelineEngine, PipelineState,
        RunContext, RunOptions,
    };
    pub use std::sync::Arc;
}
