//! Rate Limiter
//!
//! Minimum inter-request interval per key. The geocoding service keys it
//! by provider.
//!
//! State lives in process memory only. Running several instances behind a
//! load balancer multiplies the effective rate; a shared store would be
//! needed for that deployment shape.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Minimum time between two requests with the same key
    pub min_interval: Duration,
    /// Key count above which stale entries are pruned on the next check
    pub prune_threshold: usize,
    /// Entries not touched for this long are removed by pruning
    pub prune_max_age: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(1000),
            prune_threshold: 100,
            prune_max_age: Duration::from_secs(10),
        }
    }
}

impl RateLimitConfig {
    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            ..Default::default()
        }
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq)]
pub enum RateLimitResult {
    /// Request is allowed and has been recorded
    Allowed,
    /// Request is rate limited
    Limited { retry_after_ms: u64 },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Per-key minimum interval limiter.
///
/// Maps each key to the timestamp of its last allowed request.
pub struct RateLimiter {
    config: RateLimitConfig,
    /// Last allowed request per key (ms since limiter start)
    clients: DashMap<String, u64>,
    started: Instant,
}

impl RateLimiter {
    /// Create a new rate limiter.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: DashMap::new(),
            started: Instant::now(),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Check whether a request for `key` may proceed, recording it if so.
    ///
    /// The check and the record happen under the entry's shard lock, so two
    /// concurrent callers with the same key cannot both be allowed.
    pub fn check(&self, key: &str) -> RateLimitResult {
        let now_ms = self.now_ms();
        let interval_ms = self.config.min_interval.as_millis() as u64;

        let result = match self.clients.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let elapsed = now_ms.saturating_sub(*entry.get());
                if elapsed < interval_ms {
                    RateLimitResult::Limited {
                        retry_after_ms: interval_ms - elapsed,
                    }
                } else {
                    entry.insert(now_ms);
                    RateLimitResult::Allowed
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now_ms);
                RateLimitResult::Allowed
            }
        };

        if self.clients.len() > self.config.prune_threshold {
            self.prune(now_ms);
        }

        result
    }

    fn prune(&self, now_ms: u64) {
        let max_age_ms = self.config.prune_max_age.as_millis() as u64;
        let before = self.clients.len();
        self.clients
            .retain(|_, last| now_ms.saturating_sub(*last) < max_age_ms);
        let removed = before.saturating_sub(self.clients.len());
        if removed > 0 {
            tracing::debug!("rate limiter pruned {} stale keys", removed);
        }
    }

    /// Clear rate limit state for a key.
    pub fn clear(&self, key: &str) {
        self.clients.remove(key);
    }

    /// Clear all rate limit state.
    pub fn clear_all(&self) {
        self.clients.clear();
    }

    /// Get the number of tracked keys.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Remove entries that haven't been seen for `max_age`.
    pub fn cleanup(&self, max_age: Duration) {
        let now_ms = self.now_ms();
        let max_age_ms = max_age.as_millis() as u64;
        self.clients
            .retain(|_, last| now_ms.saturating_sub(*last) < max_age_ms);
    }

    /// Start periodic cleanup task.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub fn start_cleanup_with_arc(limiter: std::sync::Arc<Self>, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                ticker.tick().await;

                let before = limiter.clients.len();
                limiter.cleanup(limiter.config.prune_max_age);
                let after = limiter.clients.len();

                if before != after {
                    tracing::debug!(
                        "rate limiter cleanup: removed {} stale entries",
                        before - after
                    );
                }
            }
        });
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
