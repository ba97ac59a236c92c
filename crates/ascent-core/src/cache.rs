//! Explicit TTL cache.
//!
//! A small key -> (value, expiry) map used for the baseline cache (24 h)
//! and the preview cache (7 d). The caller supplies the current instant on
//! every operation, so expiry is fully deterministic under a test clock.

use std::collections::HashMap;
use std::hash::Hash;

use chrono::{DateTime, Duration, Utc};

/// In-memory cache where every entry carries an absolute expiry instant.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: HashMap<K, (V, DateTime<Utc>)>,
    ttl: Duration,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    /// Create a cache whose entries live for `ttl` after insertion.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Fetch a live entry. Expired entries are dropped on access.
    pub fn get(&mut self, key: &K, now: DateTime<Utc>) -> Option<V> {
        match self.entries.get(key) {
            Some((value, expires_at)) if *expires_at > now => Some(value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert a value, replacing any existing entry for the key.
    pub fn insert(&mut self, key: K, value: V, now: DateTime<Utc>) {
        self.entries.insert(key, (value, now + self.ttl));
    }

    /// Drop a single entry regardless of freshness.
    pub fn invalidate(&mut self, key: &K) {
        self.entries.remove(key);
    }

    /// Drop every entry whose expiry has passed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) {
        self.entries.retain(|_, (_, expires_at)| *expires_at > now);
    }

    /// Number of entries, live or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
