//! Fingerprint-keyed result cache with lazy TTL expiry.
//!
//! Entries carry an absolute expiry. An expired entry is removed by the
//! first read that finds it; nothing sweeps in the background.
//!
//! # INV: No result outlives the rules it came from
//!
//! Every entry is stamped with the rule generation its walk started under.
//! [`ResultCache::invalidate`] bumps the generation, and `get` treats any
//! entry from an older generation as a miss. A walk that started before a
//! rule change therefore cannot be served after it, even when its insert
//! lands after the clear.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Cache settings for a [`Matcher`](crate::Matcher).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize, serde::Deserialize))]
pub struct CacheConfig {
    /// How long a cached result stays valid.
    pub ttl: Duration,
}

impl CacheConfig {
    /// Create a config with the given TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
        }
    }
}

struct CacheEntry<T> {
    result: Option<T>,
    expires_at: Instant,
    generation: u64,
}

impl<T> CacheEntry<T> {
    fn is_live(&self, now: Instant, generation: u64) -> bool {
        self.generation == generation && self.expires_at > now
    }
}

pub(crate) struct ResultCache<T> {
    config: CacheConfig,
    entries: DashMap<String, CacheEntry<T>>,
    generation: AtomicU64,
}

impl<T: Clone> ResultCache<T> {
    pub(crate) fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// The current rule generation. Read it before walking the rules and
    /// hand it back to [`insert`](Self::insert).
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Retire every entry: bump the generation, then drop what is stored.
    pub(crate) fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
    }

    pub(crate) fn config(&self) -> CacheConfig {
        self.config
    }

    /// `Some(result)` on a live hit, `None` on a miss. The inner `Option`
    /// is the cached outcome, which may itself be "no match".
    pub(crate) fn get(&self, key: &str) -> Option<Option<T>> {
        let now = Instant::now();
        let generation = self.generation();
        {
            let entry = self.entries.get(key)?;
            if entry.is_live(now, generation) {
                return Some(entry.result.clone());
            }
        }
        // The read guard is released above; removing while holding it would
        // deadlock the shard.
        if self
            .entries
            .remove_if(key, |_, e| !e.is_live(now, generation))
            .is_some()
        {
            tracing::debug!(key, "evicted stale cache entry");
        }
        None
    }

    /// Store a result computed under `generation`. A result from an older
    /// generation is dropped.
    pub(crate) fn insert(&self, key: String, result: Option<T>, generation: u64) {
        if generation != self.generation() {
            tracing::trace!(key, "discarded result from a retired rule set");
            return;
        }
        let expires_at = Instant::now() + self.config.ttl;
        self.entries.insert(
            key,
            CacheEntry {
                result,
                expires_at,
                generation,
            },
        );
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

}
