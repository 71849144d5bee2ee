//! Keyed TTL store shared by the cache facades.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Thread-safe map from string key to value with per-entry expiry.
///
/// An entry is logically absent once its expiry has passed even if the
/// background sweep has not removed it yet; `get` enforces this on every
/// read. There is deliberately no size-based eviction: the keyed domains
/// (event slugs, session ids) are bounded by business volume, not by
/// arbitrary request input.
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
}

impl<V> Default for TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Clone of the live value for `key`, or `None` when absent or expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let entry = self.entries.get(key)?;
        if Instant::now() >= entry.expires_at {
            // Drop the shard guard before mutating; re-check expiry so a
            // concurrent `set` that just refreshed the key survives.
            drop(entry);
            self.entries
                .remove_if(key, |_, entry| Instant::now() >= entry.expires_at);
            return None;
        }
        Some(entry.value.clone())
    }

    /// Insert or overwrite `key`, resetting its expiry to `ttl` from now.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| now < entry.expires_at)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every physically stored entry whose expiry has passed. Returns
    /// the number of entries removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        before.saturating_sub(self.entries.len())
    }

    /// Spawn the periodic sweep task. Runs until aborted; independent of
    /// request traffic.
    pub fn spawn_sweeper(
        cache: &Arc<Self>,
        interval: Duration,
        label: &'static str,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(cache);
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.tick().await; // the first tick fires immediately
            loop {
                ticker.tick().await;
                let removed = cache.sweep();
                if removed > 0 {
                    debug!(
                        target = "pollcast::cache::sweep",
                        cache = label,
                        removed,
                        remaining = cache.entries.len(),
                        "Swept expired cache entries"
                    );
                }
            }
        })
    }
}
