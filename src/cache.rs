use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::CacheConfig;

#[derive(Clone, Debug)]
struct CacheEntry {
    value: String,
    stored_at: Instant,
    created_at: DateTime<Utc>,
    hits: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub total_hits: u64,
    pub average_hits: f64,
    pub oldest: Option<DateTime<Utc>>,
}

/// Bounded LRU memo of generated text with an absolute TTL per entry.
///
/// Shared across learners. The cache is advisory: a disabled cache (capacity 0)
/// simply misses on every lookup.
pub struct ResponseCache {
    entries: Option<Mutex<LruCache<String, CacheEntry>>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        ResponseCache {
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            ttl,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity, config.ttl())
    }

    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Case and whitespace normalized composite key
    pub fn key(topic: &str, question: &str, user_input: &str) -> String {
        format!(
            "{}::{}::{}",
            normalize(topic),
            normalize(question),
            normalize(user_input)
        )
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.as_ref()?;
        let mut cache = entries.lock();

        let expired = match cache.peek(key) {
            Some(entry) => entry.stored_at.elapsed() > self.ttl,
            None => {
                tracing::debug!(key, "Cache miss");
                return None;
            }
        };

        if expired {
            cache.pop(key);
            tracing::debug!(key, "Cache entry expired");
            return None;
        }

        let entry = cache.get_mut(key)?;
        entry.hits += 1;
        tracing::debug!(key, hits = entry.hits, "Cache hit");
        Some(entry.value.clone())
    }

    pub fn set(&self, key: String, value: String) {
        let Some(entries) = self.entries.as_ref() else {
            return;
        };
        let entry = CacheEntry {
            value,
            stored_at: Instant::now(),
            created_at: Utc::now(),
            hits: 0,
        };
        // `push` evicts the least recently used entry when the key is new and the cache is full
        if let Some((evicted, _)) = entries.lock().push(key.clone(), entry) {
            if evicted != key {
                tracing::debug!(key = %evicted, "Cache entry evicted");
            }
        }
    }

    /// Remove every entry older than the TTL. Returns how many were dropped.
    pub fn clear_expired(&self) -> usize {
        let Some(entries) = self.entries.as_ref() else {
            return 0;
        };
        let mut cache = entries.lock();
        let expired: Vec<String> = cache
            .iter()
            .filter(|(_, entry)| entry.stored_at.elapsed() > self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            cache.pop(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |entries| entries.lock().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let Some(entries) = self.entries.as_ref() else {
            return CacheStats::default();
        };
        let cache = entries.lock();
        let size = cache.len();
        let total_hits: u64 = cache.iter().map(|(_, entry)| entry.hits).sum();
        CacheStats {
            size,
            total_hits,
            average_hits: if size > 0 {
                total_hits as f64 / size as f64
            } else {
                0.0
            },
            oldest: cache.iter().map(|(_, entry)| entry.created_at).min(),
        }
    }
}

fn normalize(part: &str) -> String {
    part.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Short stable fingerprint for long inputs such as prompts
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}
