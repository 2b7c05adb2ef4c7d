//! Sliding-window admission control.

use crate::config::{LlmConfig, ProviderId};
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// Ceiling used for providers with no configured limit.
const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;

/// Per-provider requests-per-window limiter.
///
/// The limiter never blocks or queues: a rejected caller either waits or
/// moves to the next provider.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    limits: HashMap<ProviderId, u32>,
    requests: DashMap<ProviderId, VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter with a 60-second window.
    #[must_use]
    pub fn new(limits: HashMap<ProviderId, u32>) -> Self {
        Self {
            window: Duration::from_secs(60),
            limits,
            requests: DashMap::new(),
        }
    }

    /// Creates a limiter from the configured requests-per-minute figures.
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(config.rate_limits())
    }

    /// Overrides the window length.
    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    fn limit(&self, provider: ProviderId) -> u32 {
        self.limits
            .get(&provider)
            .copied()
            .unwrap_or(DEFAULT_REQUESTS_PER_MINUTE)
    }

    fn prune(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        while timestamps
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            timestamps.pop_front();
        }
    }

    /// Admits one request if the provider is under its ceiling.
    pub fn try_acquire(&self, provider: ProviderId) -> bool {
        let now = Instant::now();
        let limit = self.limit(provider) as usize;
        let mut timestamps = self.requests.entry(provider).or_default();
        self.prune(&mut timestamps, now);
        if timestamps.len() < limit {
            timestamps.push_back(now);
            true
        } else {
            false
        }
    }

    /// Time until the oldest request leaves the window.
    #[must_use]
    pub fn retry_after(&self, provider: ProviderId) -> Duration {
        let now = Instant::now();
        self.requests
            .get(&provider)
            .and_then(|t| t.front().copied())
            .map_or(Duration::ZERO, |oldest| {
                self.window.saturating_sub(now.duration_since(oldest))
            })
    }

    /// Requests admitted within the current window.
    #[must_use]
    pub fn in_window(&self, provider: ProviderId) -> usize {
        let now = Instant::now();
        self.requests.get(&provider).map_or(0, |t| {
            t.iter()
                .filter(|at| now.duration_since(**at) < self.window)
                .count()
        })
    }
}
