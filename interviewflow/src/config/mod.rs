//! Static configuration: providers, credentials, per-task model settings,
//! cache/budget limits and the refinement policy.
//!
//! Everything here is resolved once at startup and validated before any
//! pipeline runs. Credentials are never hot-reloaded.

mod llm;
mod provider;
mod task;

pub use llm::{BudgetConfig, CacheConfig, LlmConfig, RefinementConfig};
pub use provider::{Credentials, ProviderId, ProviderSettings};
pub use task::{default_task_table, TaskConfig, TaskName};
