//! Error types for the interviewflow crate.
//!
//! Errors are layered the way calls are layered: configuration problems are
//! caught at startup, provider-level failures are recovered by the
//! orchestration layer, node failures are recorded into pipeline state, and
//! only fatal engine conditions end a run early.

use crate::config::{ProviderId, TaskName};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// The top-level error type for interviewflow operations.
#[derive(Debug, Error)]
pub enum InterviewflowError {
    /// Configuration failed validation.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A model invocation failed.
    #[error("{0}")]
    Llm(#[from] LlmError),

    /// A fatal pipeline error.
    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    /// The persistence boundary failed.
    #[error("{0}")]
    Storage(#[from] StorageError),
}

/// Error raised when configuration is invalid.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// One or more validation rules failed.
    #[error("invalid configuration: {}", .issues.join("; "))]
    Invalid {
        /// Every rule violation found.
        issues: Vec<String>,
    },

    /// A task has no configuration entry.
    #[error("missing task configuration for '{0}'")]
    MissingTask(TaskName),

    /// Configuration could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    /// Creates an invalid-configuration error from a list of issues.
    #[must_use]
    pub fn invalid(issues: Vec<String>) -> Self {
        Self::Invalid { issues }
    }
}

/// Errors raised while invoking model providers.
///
/// Provider-level variants are recovered locally by fallback. Only
/// [`LlmError::AllProvidersExhausted`] is expected to reach pipeline nodes.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No credentials or no client for the provider.
    #[error("provider '{provider}' is unavailable")]
    ProviderUnavailable {
        /// The provider.
        provider: ProviderId,
    },

    /// The local admission check rejected the request.
    #[error("provider '{provider}' rate limited locally, retry after {retry_after:?}")]
    RateLimited {
        /// The provider.
        provider: ProviderId,
        /// Time until the oldest request leaves the window.
        retry_after: Duration,
    },

    /// The provider signalled temporary capacity failure.
    #[error("provider '{provider}' is overloaded: {message}")]
    TransientOverload {
        /// The provider.
        provider: ProviderId,
        /// Provider message.
        message: String,
    },

    /// The response parsed as data but failed the schema.
    #[error("provider '{provider}' response failed schema '{schema}': {message}")]
    SchemaValidation {
        /// The provider.
        provider: ProviderId,
        /// Schema name.
        schema: String,
        /// Violation details.
        message: String,
    },

    /// The response could not be parsed as data at all.
    #[error("provider '{provider}' returned a malformed response: {message}")]
    MalformedResponse {
        /// The provider.
        provider: ProviderId,
        /// Parse failure details.
        message: String,
    },

    /// The request timed out in the provider client.
    #[error("provider '{provider}' timed out")]
    Timeout {
        /// The provider.
        provider: ProviderId,
    },

    /// Any other provider failure (HTTP error, transport failure).
    #[error("provider '{provider}' error{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Provider {
        /// The provider.
        provider: ProviderId,
        /// HTTP status, when one was received.
        status: Option<u16>,
        /// Error message.
        message: String,
    },

    /// Every candidate provider failed.
    #[error(
        "all providers exhausted for task '{task}' (tried: [{}]): {last_error}",
        .attempted.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    )]
    AllProvidersExhausted {
        /// The task.
        task: TaskName,
        /// Providers attempted, in order.
        attempted: Vec<ProviderId>,
        /// The last underlying error.
        #[source]
        last_error: Box<LlmError>,
    },

    /// Client construction or configuration failure.
    #[error("provider configuration error: {0}")]
    Config(String),
}

impl LlmError {
    /// Creates a generic provider error.
    #[must_use]
    pub fn provider(provider: ProviderId, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            status,
            message: message.into(),
        }
    }

    /// Creates a transient overload error.
    #[must_use]
    pub fn overloaded(provider: ProviderId, message: impl Into<String>) -> Self {
        Self::TransientOverload {
            provider,
            message: message.into(),
        }
    }

    /// Creates an aggregate exhaustion error.
    #[must_use]
    pub fn exhausted(task: TaskName, attempted: Vec<ProviderId>, last_error: Self) -> Self {
        Self::AllProvidersExhausted {
            task,
            attempted,
            last_error: Box::new(last_error),
        }
    }

    /// Stable snake_case name of the error class.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProviderUnavailable { .. } => "provider_unavailable",
            Self::RateLimited { .. } => "rate_limited",
            Self::TransientOverload { .. } => "transient_overload",
            Self::SchemaValidation { .. } => "schema_validation_failure",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::Timeout { .. } => "timeout",
            Self::Provider { .. } => "provider_error",
            Self::AllProvidersExhausted { .. } => "all_providers_exhausted",
            Self::Config(_) => "config",
        }
    }

    /// Returns true when the provider signalled temporary overload.
    #[must_use]
    pub fn is_transient_overload(&self) -> bool {
        matches!(self, Self::TransientOverload { .. })
    }

    /// Returns true when the failure happened before any network call.
    #[must_use]
    pub fn is_local_rejection(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable { .. } | Self::RateLimited { .. }
        )
    }

    /// Returns true when the caller should wait before trying the next provider.
    #[must_use]
    pub fn warrants_backoff(&self) -> bool {
        !(self.is_transient_overload() || self.is_local_rejection())
    }

    /// The provider the error originated from, if any.
    #[must_use]
    pub fn provider_id(&self) -> Option<ProviderId> {
        match self {
            Self::ProviderUnavailable { provider }
            | Self::RateLimited { provider, .. }
            | Self::TransientOverload { provider, .. }
            | Self::SchemaValidation { provider, .. }
            | Self::MalformedResponse { provider, .. }
            | Self::Timeout { provider }
            | Self::Provider { provider, .. } => Some(*provider),
            Self::AllProvidersExhausted { .. } | Self::Config(_) => None,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        if let Some(provider) = self.provider_id() {
            map.insert("provider".to_string(), serde_json::json!(provider));
        }
        if let Self::AllProvidersExhausted { task, attempted, .. } = self {
            map.insert("task".to_string(), serde_json::json!(task));
            map.insert("attempted".to_string(), serde_json::json!(attempted));
        }
        map
    }
}

/// Error raised by a single pipeline node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Recoverable node failure, routed to the recovery node.
    #[error("{0}")]
    Recoverable(String),

    /// A model invocation failed after fallback.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// The persistence boundary failed. Always fatal.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Explicitly fatal failure.
    #[error("{0}")]
    Fatal(String),

    /// Internal failure with context.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NodeError {
    /// Creates a recoverable node error.
    #[must_use]
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self::Recoverable(message.into())
    }

    /// Creates a fatal node error.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// Returns true when the error must end the run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Fatal(_))
    }
}

/// Fatal errors that end a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The graph definition is invalid.
    #[error("invalid pipeline graph: {0}")]
    InvalidGraph(String),

    /// A routing directive named a node that does not exist.
    #[error("node '{from}' routed to unknown node '{target}'")]
    UnknownNode {
        /// Node that issued the directive.
        from: String,
        /// Missing target.
        target: String,
    },

    /// A node finished without a directive and has no static edge.
    #[error("node '{node}' has no outgoing edge")]
    MissingEdge {
        /// The node.
        node: String,
    },

    /// A node routed backward without being declared as a loop gate.
    #[error("node '{from}' is not permitted to route backward to '{target}'")]
    IllegalBackwardRoute {
        /// Node that issued the directive.
        from: String,
        /// Earlier node.
        target: String,
    },

    /// A node failed and no recovery route was reachable.
    #[error("node '{node}' failed and no recovery node is reachable: {message}")]
    Unrecovered {
        /// The failing node.
        node: String,
        /// The failure message.
        message: String,
    },

    /// The run executed more nodes than allowed.
    #[error("step limit of {limit} node executions exceeded")]
    StepLimitExceeded {
        /// The configured limit.
        limit: usize,
    },

    /// The run-level deadline passed.
    #[error("run deadline exceeded while at node '{node}'")]
    DeadlineExceeded {
        /// Node that was running or about to run.
        node: String,
    },

    /// The run was cancelled.
    #[error("run cancelled: {reason}")]
    Cancelled {
        /// Cancellation reason.
        reason: String,
    },

    /// A node raised a fatal error.
    #[error("node '{node}' failed fatally: {source}")]
    NodeFatal {
        /// The node.
        node: String,
        /// Underlying error, unchanged.
        #[source]
        source: NodeError,
    },
}

/// Errors raised by the persistence boundary.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure.
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure.
    #[error("storage serialization error: {0}")]
    Serialization(String),

    /// Backend-specific failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Serializable failure record used for reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Where the error was raised (node or component).
    pub source: String,
    /// Error message.
    pub message: String,
}

impl ErrorRecord {
    /// Creates a new error record.
    #[must_use]
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.source, self.message)
    }
}
