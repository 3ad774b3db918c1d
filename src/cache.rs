//! In-process TTL cache
//!
//! Key → bytes store with per-entry expiry. Entries live in a `DashMap` so
//! callers never hold a lock across an await. A background sweeper removes
//! expired entries; `get` also treats an expired entry as missing, so the
//! sweep interval only bounds memory, not correctness.
//!
//! Concurrent writers to one key are last-write-wins.

use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone)]
struct CacheEntry {
    bytes: Vec<u8>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe TTL cache
pub struct TtlCache {
    entries: DashMap<String, CacheEntry>,
    default_ttl: Duration,
}

impl TtlCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn set(&self, key: &str, bytes: Vec<u8>, ttl: Duration) {
        let entry = CacheEntry {
            bytes,
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key.to_string(), entry);
    }

    pub fn set_default(&self, key: &str, bytes: Vec<u8>) {
        self.set(key, bytes, self.default_ttl);
    }

    /// Fails with `NotFound` when absent or expired
    pub fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(entry.bytes.clone());
            }
        }
        // Read guard is released; a concurrent writer may have replaced the entry.
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Err(StoreError::NotFound(key.to_string()))
    }

    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drop every entry
    pub fn invalidate(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove expired entries, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Spawn the periodic sweep. The task exits once the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache: Weak<TtlCache> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    debug!("Cache dropped, sweeper exiting");
                    break;
                };
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!(purged, remaining = cache.len(), "Cache sweep");
                }
            }
        })
    }
}
