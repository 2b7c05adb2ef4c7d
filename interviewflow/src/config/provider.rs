//! Provider identifiers, per-provider settings and credentials.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// An external model-inference backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderId {
    /// Anthropic Messages API.
    #[serde(rename = "anthropic")]
    Anthropic,
    /// OpenAI chat completions.
    #[serde(rename = "openai")]
    OpenAi,
    /// Google Gemini generateContent.
    #[serde(rename = "gemini")]
    Gemini,
    /// DeepSeek (OpenAI-compatible).
    #[serde(rename = "deepseek")]
    DeepSeek,
}

impl ProviderId {
    /// Every known provider.
    pub const ALL: [Self; 4] = [Self::Anthropic, Self::OpenAi, Self::Gemini, Self::DeepSeek];

    /// Returns the wire name of the provider.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::DeepSeek => "deepseek",
        }
    }

    /// Environment variables checked for the provider's API key, in order.
    #[must_use]
    pub fn env_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Anthropic => &["ANTHROPIC_API_KEY"],
            Self::OpenAi => &["OPENAI_API_KEY"],
            Self::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            Self::DeepSeek => &["DEEPSEEK_API_KEY"],
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            "gemini" | "google" => Ok(Self::Gemini),
            "deepseek" => Ok(Self::DeepSeek),
            other => Err(format!("unknown provider '{other}'")),
        }
    }
}

/// Connection settings for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Model used when this provider serves a task configured for another provider.
    pub default_model: String,
    /// API base URL.
    pub base_url: String,
    /// Request timeout in seconds, enforced by the HTTP client.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// Hard requests-per-minute ceiling for local admission control.
    #[serde(default = "default_rpm")]
    pub requests_per_minute: u32,
}

fn default_timeout() -> f64 {
    120.0
}

fn default_rpm() -> u32 {
    60
}

impl ProviderSettings {
    /// Built-in settings for a provider.
    #[must_use]
    pub fn defaults_for(provider: ProviderId) -> Self {
        let (model, url, rpm) = match provider {
            ProviderId::Anthropic => ("claude-sonnet-4-20250514", "https://api.anthropic.com", 50),
            ProviderId::OpenAi => ("gpt-4o", "https://api.openai.com/v1", 500),
            ProviderId::Gemini => (
                "gemini-2.0-flash",
                "https://generativelanguage.googleapis.com",
                60,
            ),
            ProviderId::DeepSeek => ("deepseek-chat", "https://api.deepseek.com/v1", 60),
        };
        Self {
            default_model: model.to_string(),
            base_url: url.to_string(),
            timeout_seconds: default_timeout(),
            requests_per_minute: rpm,
        }
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the requests-per-minute ceiling.
    #[must_use]
    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.requests_per_minute = rpm;
        self
    }

    /// Gets the timeout as a Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds.max(0.0))
    }
}

/// API keys per provider. A missing key marks the provider unavailable
/// for the whole process lifetime.
#[derive(Clone, Default)]
pub struct Credentials {
    keys: HashMap<ProviderId, String>,
}

impl Credentials {
    /// Creates an empty credential set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads keys from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads keys through an arbitrary lookup function.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut credentials = Self::new();
        for provider in ProviderId::ALL {
            if let Some(key) = provider.env_keys().iter().find_map(|name| lookup(name)) {
                credentials = credentials.with_key(provider, key);
            }
        }
        credentials
    }

    /// Adds a key. Blank keys are ignored.
    #[must_use]
    pub fn with_key(mut self, provider: ProviderId, key: impl Into<String>) -> Self {
        let key = key.into();
        if !key.trim().is_empty() {
            self.keys.insert(provider, key.trim().to_string());
        }
        self
    }

    /// Returns the key for a provider.
    #[must_use]
    pub fn get(&self, provider: ProviderId) -> Option<&str> {
        self.keys.get(&provider).map(String::as_str)
    }

    /// Returns true if a key is present.
    #[must_use]
    pub fn has(&self, provider: ProviderId) -> bool {
        self.keys.contains_key(&provider)
    }

    /// Providers with a key, in canonical order.
    #[must_use]
    pub fn providers(&self) -> Vec<ProviderId> {
        ProviderId::ALL.into_iter().filter(|p| self.has(*p)).collect()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("providers", &self.providers())
            .finish()
    }
}
