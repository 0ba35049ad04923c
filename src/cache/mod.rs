//! In-memory response cache with per-entry time-to-live.
//!
//! Expiry is enforced on read: an entry whose deadline has passed is removed
//! by the `get` that finds it and reported as a miss. Two background mechanisms
//! only reclaim memory for keys nobody reads again: a one-shot task scheduled by
//! [`ResponseCache::set`] and the periodic [`ResponseCache::cleanup`] sweep.
//! All three agree on the same test, `now > expires_at`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::clock::{duration_millis, now_millis};
use crate::models::{CacheEntry, CacheStats};


#[derive(Clone, Default)]
pub struct ResponseCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key` for `ttl` and schedules its removal.
    pub async fn set(&self, key: &str, value: Value, ttl: Duration) {
        self.set_at(key, value, ttl, now_millis()).await;
        self.schedule_expiry(key, ttl);
    }

    /// Stores `value` as if written at `now`, without scheduling removal.
    pub async fn set_at(&self, key: &str, value: Value, ttl: Duration, now: i64) {
        let entry = CacheEntry {
            value,
            expires_at: now.saturating_add(duration_millis(ttl)),
        };
        self.entries.write().await.insert(key.to_string(), entry);
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.get_at(key, now_millis()).await
    }

    pub async fn get_at(&self, key: &str, now: i64) -> Option<Value> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        // Expired under the read lock; re-check under the write lock since a
        // concurrent `set` may have replaced the entry in between.
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                trace!(key, "evicted expired cache entry on read");
                None
            }
            None => None,
        }
    }

    /// Removes `key`. Returns whether an entry was present.
    pub async fn delete(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Removes every expired entry and returns how many were dropped.
    pub async fn cleanup(&self) -> usize {
        self.cleanup_at(now_millis()).await
    }

    pub async fn cleanup_at(&self, now: i64) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats_at(now_millis()).await
    }

    pub async fn stats_at(&self, now: i64) -> CacheStats {
        let entries = self.entries.read().await;
        let expired_items = entries.values().filter(|e| e.is_expired(now)).count();
        CacheStats {
            total_items: entries.len(),
            valid_items: entries.len() - expired_items,
            expired_items,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Removes `key` only if it is expired at `now`, so a newer write survives
    /// an older entry's scheduled removal.
    pub async fn remove_if_expired(&self, key: &str, now: i64) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    // Best effort: outside a Tokio runtime the sweep and lazy expiry still apply.
    fn schedule_expiry(&self, key: &str, ttl: Duration) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let cache = self.clone();
        let key = key.to_string();
        // One millisecond past the deadline, since an entry is still valid at exactly `expires_at`.
        let delay = ttl.saturating_add(Duration::from_millis(1));
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if cache.remove_if_expired(&key, now_millis()).await {
                debug!(key = %key, "cache entry expired");
            }
        });
    }
}
