//! Result Cache
//!
//! Memoizes forward-search results by normalized query signature.
//! Entries expire by TTL and the map is bounded by a capacity.

use crate::domain::entities::{GeocodeQuery, GeocodeResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long an entry stays live after insertion
    pub ttl: Duration,
    /// Maximum number of entries kept
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            capacity: 2000,
        }
    }
}

/// Normalized signature of a forward query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build the key from a validated query.
    ///
    /// Text is lower-cased with whitespace collapsed; a recognised postal
    /// code is keyed by its canonical form so spacing variants share an
    /// entry. Proximity is rounded to five decimals (about a metre).
    pub fn from_query(query: &GeocodeQuery) -> Self {
        let text = match &query.postal_code {
            Some(code) => code.normalized().to_lowercase(),
            None => query
                .text
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase(),
        };
        let proximity = query
            .proximity
            .map(|p| format!("{:.5},{:.5}", p.lon, p.lat))
            .unwrap_or_default();

        Self(format!(
            "{}|{}|{}|{}|{}",
            text,
            query.country.as_deref().unwrap_or(""),
            query.limit,
            proximity,
            query.language.as_deref().unwrap_or("").to_lowercase(),
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored result set. Never mutated after insertion.
#[derive(Debug, Clone)]
struct CacheEntry {
    results: Arc<[GeocodeResult]>,
    inserted_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() >= ttl
    }
}

/// TTL + capacity bounded cache of forward-search results.
pub struct ResultCache {
    config: CacheConfig,
    entries: DashMap<CacheKey, CacheEntry>,
}

impl ResultCache {
    /// Create a new cache.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a live entry. Expired entries are dropped on the way.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<[GeocodeResult]>> {
        let ttl = self.config.ttl;
        let hit = self.entries.get(key).map(|e| {
            if e.is_expired(ttl) {
                None
            } else {
                Some(e.results.clone())
            }
        })?;

        if hit.is_none() {
            self.entries.remove_if(key, |_, e| e.is_expired(ttl));
        }
        hit
    }

    /// Store a result set. A live entry under the same key is kept as is.
    pub fn insert(&self, key: CacheKey, results: Vec<GeocodeResult>) -> Arc<[GeocodeResult]> {
        if self.config.capacity == 0 {
            return results.into();
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.config.capacity {
            self.make_room();
        }

        let ttl = self.config.ttl;
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(ttl) {
                    let entry = CacheEntry {
                        results: results.into(),
                        inserted_at: Instant::now(),
                    };
                    let stored = entry.results.clone();
                    occupied.insert(entry);
                    stored
                } else {
                    occupied.get().results.clone()
                }
            }
            Entry::Vacant(vacant) => {
                let entry = CacheEntry {
                    results: results.into(),
                    inserted_at: Instant::now(),
                };
                let stored = entry.results.clone();
                vacant.insert(entry);
                stored
            }
        }
    }

    /// Drop expired entries, then the oldest live one if still full.
    fn make_room(&self) {
        let removed = self.purge_expired();
        if removed > 0 || self.entries.len() < self.config.capacity {
            return;
        }

        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().inserted_at)
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            tracing::debug!("result cache full, evicted {}", key);
        }
    }

    /// Remove expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let ttl = self.config.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(ttl));
        before.saturating_sub(self.entries.len())
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start periodic purge task.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub fn start_cleanup_with_arc(cache: Arc<Self>, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = cache.purge_expired();
                if removed > 0 {
                    tracing::debug!("result cache cleanup: removed {} expired entries", removed);
                }
            }
        });
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
