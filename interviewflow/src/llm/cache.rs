//! TTL response cache shared by every run in the process.

use super::{GenerationOptions, GenerationResult};
use crate::config::{CacheConfig, TaskName};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that found nothing live.
    pub misses: u64,
    /// Entries dropped to respect the size bound.
    pub evictions: u64,
    /// Live and not-yet-pruned entries.
    pub entries: usize,
}

impl CacheStats {
    /// Hit ratio in [0, 1].
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: GenerationResult,
    expires_at: Instant,
    sequence: u64,
}

/// Builds the cache key for a call.
///
/// The key covers everything that changes the response: task, prompt and
/// the per-call options other than the cache bypass flag.
#[must_use]
pub fn cache_key(task: TaskName, prompt: &str, options: &GenerationOptions) -> String {
    let options = serde_json::to_string(options).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(task.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(options.as_bytes());
    hasher.update([0]);
    hasher.update(prompt.as_bytes());
    hex::encode(hasher.finalize())
}

/// `(task, prompt, options) -> GenerationResult` with absolute expiry.
///
/// On overflow the oldest inserted entry is evicted. This is insertion order,
/// not recency of use.
#[derive(Debug)]
pub struct ResponseCache {
    enabled: bool,
    ttl: Duration,
    max_entries: usize,
    entries: DashMap<String, CacheEntry>,
    sequence: AtomicU64,
    write_lock: Mutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ResponseCache {
    /// Creates a cache.
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            enabled: true,
            ttl,
            max_entries: max_entries.max(1),
            entries: DashMap::new(),
            sequence: AtomicU64::new(0),
            write_lock: Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Creates a cache from configuration.
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        let mut cache = Self::new(config.ttl(), config.max_entries);
        cache.enabled = config.enabled;
        cache
    }

    /// Creates a cache that stores nothing.
    #[must_use]
    pub fn disabled() -> Self {
        let mut cache = Self::new(Duration::ZERO, 1);
        cache.enabled = false;
        cache
    }

    /// Returns true if the cache stores anything.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Looks up a live entry. The returned result is marked `cached`.
    pub fn get(&self, key: &str) -> Option<GenerationResult> {
        if !self.enabled {
            return None;
        }
        let now = Instant::now();
        let lookup = self
            .entries
            .get(key)
            .map(|entry| (entry.expires_at > now).then(|| entry.result.clone()));
        match lookup {
            Some(Some(mut result)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                result.cached = true;
                Some(result)
            }
            Some(None) => {
                self.entries.remove_if(key, |_, e| e.expires_at <= now);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores a result, evicting the oldest entry when full.
    pub fn put(&self, key: impl Into<String>, result: GenerationResult) {
        if !self.enabled {
            return;
        }
        let key = key.into();
        let _guard = self.write_lock.lock();
        if !self.entries.contains_key(&key) {
            self.purge_expired();
            while self.entries.len() >= self.max_entries {
                let oldest = self
                    .entries
                    .iter()
                    .min_by_key(|e| e.sequence)
                    .map(|e| e.key().clone());
                let Some(oldest) = oldest else { break };
                self.entries.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %oldest, "Evicted oldest cache entry");
            }
        }
        let entry = CacheEntry {
            result: GenerationResult {
                cached: false,
                ..result
            },
            expires_at: Instant::now() + self.ttl,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        self.entries.insert(key, entry);
    }

    /// Removes one entry.
    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, e| e.expires_at > now);
    }
}
