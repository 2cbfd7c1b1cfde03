use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use tracing::debug;

use crate::sql::DbFingerprint;

/// Key for a memoized query: the exact SQL text plus the row limit it ran with
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub sql: String,
    pub row_limit: usize,
}

impl QueryKey {
    pub fn new(sql: impl Into<String>, row_limit: usize) -> Self {
        Self {
            sql: sql.into(),
            row_limit,
        }
    }
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

/// Bounded memoizing cache tied to one database file.
///
/// Entries are only valid for the database snapshot they were computed from;
/// [`QueryCache::validate`] drops everything when the file's fingerprint moves.
pub struct QueryCache<K, V> {
    /// `None` when caching is disabled
    entries: Option<LruCache<K, V>>,
    /// Fingerprint of the database the entries came from
    fingerprint: Option<DbFingerprint>,
    stats: CacheStats,
}

impl<K: Hash + Eq, V: Clone> QueryCache<K, V> {
    /// Create a cache holding up to `capacity` entries; 0 disables caching
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(LruCache::new),
            fingerprint: None,
            stats: CacheStats::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    /// True when entries were computed from a different database snapshot.
    /// Nothing is recorded; see [`QueryCache::validate`].
    pub fn is_stale(&self, current: DbFingerprint) -> bool {
        matches!(self.fingerprint, Some(previous) if previous != current)
    }

    /// Compare against the current database fingerprint, clearing on change.
    /// Returns true when entries were dropped.
    pub fn validate(&mut self, current: DbFingerprint) -> bool {
        match self.fingerprint {
            Some(previous) if previous == current => false,
            Some(_) => {
                debug!("Database changed on disk, clearing query cache");
                self.clear();
                self.fingerprint = Some(current);
                self.stats.invalidations += 1;
                true
            }
            None => {
                self.fingerprint = Some(current);
                false
            }
        }
    }

    /// Get cached value if available
    pub fn get(&mut self, key: &K) -> Option<V> {
        let hit = self.entries.as_mut().and_then(|e| e.get(key).cloned());
        if hit.is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        hit
    }

    /// Store a value, evicting the least recently used entry when full
    pub fn insert(&mut self, key: K, value: V) {
        if let Some(entries) = self.entries.as_mut() {
            entries.put(key, value);
        }
    }

    /// Clear all cached items
    pub fn clear(&mut self) {
        if let Some(entries) = self.entries.as_mut() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |e| e.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
