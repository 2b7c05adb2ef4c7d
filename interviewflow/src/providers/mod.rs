//! Provider clients and the process-wide provider registry.
//!
//! Every vendor is reached through the same [`ModelClient`] capability so the
//! orchestration layer never branches on the vendor.

mod client;
#[cfg(feature = "http")]
pub mod http;
mod registry;
mod types;

pub use client::{ModelClient, ModelHandle};
pub use registry::{ClientFactory, ProviderRegistry};
pub use types::{Citation, Completion, CompletionRequest, GroundingMetadata};

#[cfg(feature = "http")]
pub use registry::HttpClientFactory;
