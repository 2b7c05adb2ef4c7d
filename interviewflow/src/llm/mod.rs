//! Resilient multi-provider invocation.
//!
//! The layer is built from small services that are shared by reference
//! across concurrent pipeline runs:
//!
//! - [`RateLimiter`]: per-provider sliding-window admission control
//! - [`ResponseCache`]: TTL memoization keyed by task, prompt and options
//! - [`StructuredInvoker`]: one provider call with schema enforcement
//! - [`FallbackOrchestrator`]: ordered fallback across providers
//! - [`BatchOrchestrator`]: bounded, order-preserving fan-out
//! - [`LlmService`]: the facade nodes talk to

mod batch;
mod cache;
mod fallback;
mod invoker;
mod pricing;
mod rate_limit;
mod schema;
mod service;
mod types;
mod usage;

pub use batch::BatchOrchestrator;
pub use cache::{cache_key, CacheStats, ResponseCache};
pub use fallback::FallbackOrchestrator;
pub use invoker::StructuredInvoker;
pub use pricing::{estimate_cost, ModelPricing};
pub use rate_limit::RateLimiter;
pub use schema::{extract_json, JsonSchema, PlainText, ResponseSchema, SchemaError, Validate};
pub use service::LlmService;
pub use types::{GenerationOptions, GenerationResult, StructuredResponse};
pub use usage::{ProviderUsage, UsageSnapshot, UsageTracker};
