//! In-memory response cache with exact and fuzzy lookup.
//!
//! # Expiry
//!
//! Every entry carries its own deadline. Lookups treat an expired entry as
//! absent and remove it on the spot; [`ResponseCache::prune`] sweeps the
//! rest. Time is read from [`tokio::time::Instant`], so tests running on a
//! paused runtime can advance the clock.
//!
//! # Eviction
//!
//! When an insert would exceed `max_entries`, exactly one entry is evicted:
//! the one with the lowest score `created_at - hit_count * 1s`, ties going
//! to the earlier insert. Without hits that is the oldest entry. Every hit
//! moves an entry's score a second earlier, so an entry that has been
//! served often is evicted ahead of a slightly older one that has not.
//! This is not LRU.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::similarity::{normalize_key, similarity};
use crate::telemetry;

/// Each hit lowers an entry's eviction score by this much.
const HIT_SCORE_PENALTY_MS: i128 = 1_000;

/// Configuration for a [`ResponseCache`].
///
/// ```rust
/// # use nudge::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(50)
///     .ttl(Duration::from_secs(600))
///     .similarity_threshold(0.85);
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of live entries. Default: 100.
    pub max_entries: usize,
    /// Time-to-live for entries inserted without an explicit TTL. Default: 1 hour.
    pub ttl: Duration,
    /// Minimum score for [`ResponseCache::get_similar`] to report a hit. Default: 0.8.
    pub similarity_threshold: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            ttl: Duration::from_secs(3600),
            similarity_threshold: 0.8,
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of entries.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the default time-to-live.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the fuzzy-match threshold.
    pub fn similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub total_hits: u64,
    /// `total_hits / size`, or 0 for an empty cache.
    pub hit_rate: f64,
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    expires_at: Instant,
    hit_count: u64,
    /// Insertion order; fuzzy scans prefer earlier entries.
    seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

struct Entries<V> {
    map: HashMap<String, CacheEntry<V>>,
    next_seq: u64,
}

/// Key→value cache with TTL expiry, fuzzy lookup and hit-weighted eviction.
///
/// All methods are synchronous; the internal lock is never held across an
/// `.await`.
pub struct ResponseCache<V> {
    config: CacheConfig,
    epoch: Instant,
    entries: Mutex<Entries<V>>,
}

impl<V: Clone> ResponseCache<V> {
    /// Create a new response cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        let config = CacheConfig {
            max_entries: config.max_entries.max(1),
            ..config
        };
        Self {
            config,
            epoch: Instant::now(),
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                next_seq: 0,
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Entries<V>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Exact lookup on the normalized key.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let key = normalize_key(key);
        let hit = Self::get_exact(&mut self.lock(), &key, Instant::now());
        record_lookup("exact", hit.is_some());
        hit
    }

    fn get_exact(entries: &mut Entries<V>, key: &str, now: Instant) -> Option<V> {
        let expired = match entries.map.get_mut(key) {
            None => return None,
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => {
                entry.hit_count += 1;
                return Some(entry.value.clone());
            }
        };
        if expired {
            trace!(key, "evicting expired entry on lookup");
            entries.map.remove(key);
        }
        None
    }

    /// Fuzzy lookup.
    ///
    /// Tries the exact path first. On a miss, scores every live entry
    /// against the normalized query and returns the earliest-inserted entry
    /// whose score reaches the configured threshold. Only that entry's hit
    /// count is incremented.
    pub fn get_similar(&self, key: &str) -> Option<V> {
        let key = normalize_key(key);
        let now = Instant::now();
        let mut entries = self.lock();

        if let Some(value) = Self::get_exact(&mut entries, &key, now) {
            record_lookup("similar", true);
            return Some(value);
        }

        let threshold = self.config.similarity_threshold;
        let best = entries
            .map
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .filter(|(candidate, _)| similarity(&key, candidate) >= threshold)
            .min_by_key(|(_, entry)| entry.seq)
            .map(|(candidate, _)| candidate.clone());

        let hit = best.and_then(|candidate| {
            let entry = entries.map.get_mut(&candidate)?;
            entry.hit_count += 1;
            debug!(query = %key, matched = %candidate, "fuzzy cache hit");
            Some(entry.value.clone())
        });
        record_lookup("similar", hit.is_some());
        hit
    }

    /// Whether a live entry exists for `key`. Does not count as a hit.
    pub fn contains(&self, key: &str) -> bool {
        let key = normalize_key(key);
        let now = Instant::now();
        self.lock()
            .map
            .get(&key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Insert with the default TTL.
    pub fn set(&self, key: &str, value: V) {
        self.set_with_ttl(key, value, self.config.ttl);
    }

    /// Insert with a custom TTL.
    ///
    /// If the cache is full and `key` is new, one entry is evicted first.
    pub fn set_with_ttl(&self, key: &str, value: V, ttl: Duration) {
        let key = normalize_key(key);
        let now = Instant::now();
        let ttl = ttl.max(Duration::from_millis(1));
        let mut entries = self.lock();

        if !entries.map.contains_key(&key) && entries.map.len() >= self.config.max_entries {
            self.evict_one(&mut entries);
        }

        let seq = entries.next_seq;
        entries.next_seq += 1;
        entries.map.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                expires_at: now + ttl,
                hit_count: 0,
                seq,
            },
        );
    }

    fn evict_one(&self, entries: &mut Entries<V>) {
        let victim = entries
            .map
            .iter()
            .min_by_key(|(_, entry)| (self.eviction_score(entry), entry.seq))
            .map(|(key, _)| key.clone());
        if let Some(key) = victim {
            debug!(key = %key, "cache full, evicting entry");
            entries.map.remove(&key);
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL).increment(1);
        }
    }

    /// Creation time in milliseconds since the cache epoch, minus a second
    /// per hit. Lowest goes first.
    fn eviction_score(&self, entry: &CacheEntry<V>) -> i128 {
        let created = entry.created_at.duration_since(self.epoch).as_millis() as i128;
        created - entry.hit_count as i128 * HIT_SCORE_PENALTY_MS
    }

    /// Remove an entry. Returns whether one was present.
    pub fn delete(&self, key: &str) -> bool {
        let key = normalize_key(key);
        self.lock().map.remove(&key).is_some()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.lock().map.clear();
    }

    /// Remove all expired entries, returning how many were dropped.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.map.len();
        entries.map.retain(|_, entry| !entry.is_expired(now));
        before - entries.map.len()
    }

    /// Number of stored entries, expired ones included until pruned.
    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.lock();
        let size = entries.map.len();
        let total_hits: u64 = entries.map.values().map(|e| e.hit_count).sum();
        let hit_rate = if size == 0 {
            0.0
        } else {
            total_hits as f64 / size as f64
        };
        CacheStats {
            size,
            total_hits,
            hit_rate,
        }
    }
}

fn record_lookup(lookup: &'static str, hit: bool) {
    if hit {
        metrics::counter!(telemetry::CACHE_HITS_TOTAL, "lookup" => lookup).increment(1);
    } else {
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "lookup" => lookup).increment(1);
    }
}
