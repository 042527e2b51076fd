//! Process-wide TTL caches keyed by source URL
//!
//! Entries expire lazily: an expired entry is removed by the lookup that
//! finds it, never by a background sweeper. `DashMap` shards the map so
//! concurrent producers never lock the whole cache.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Metadata cache lifetime
pub const META_TTL: Duration = Duration::from_secs(15 * 60);

/// Indirect-URL resolution cache lifetime
pub const RESOLVER_TTL: Duration = Duration::from_secs(5 * 60 * 60);

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Concurrent map whose entries expire after a fixed TTL
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: DashMap<String, Entry<V>>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up `key`, evicting it if expired
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Look up `key` as of `now`
    pub fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let expired = {
            let entry = self.entries.get(key)?;
            if now.saturating_duration_since(entry.inserted_at) <= self.ttl {
                return Some(entry.value.clone());
            }
            entry.inserted_at
        };

        // Only remove the entry we saw; a concurrent insert may have replaced it
        self.entries
            .remove_if(key, |_, entry| entry.inserted_at == expired);
        tracing::trace!(key = key, "Cache entry expired");
        None
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&self, key: impl Into<String>, value: V, now: Instant) {
        self.entries.insert(
            key.into(),
            Entry {
                value,
                inserted_at: now,
            },
        );
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    /// Entries currently stored, expired or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Probed metadata for a source
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMeta {
    /// Directly decodable URL
    pub resolved_url: String,
    pub width: i32,
    pub height: i32,
    /// Always positive
    pub fps: f64,
    /// Milliseconds, 0 when unknown
    pub duration_ms: i64,
    pub resolved_at: Instant,
}

/// Metadata cache keyed by the original source URL
pub type MetaCache = TtlCache<ResolvedMeta>;
