use crate::error::{AppError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// TTL key/value store. Expired entries are invisible to readers and are
/// physically removed by `sweep`.
#[derive(Default)]
pub struct EphemeralCache {
    entries: DashMap<String, CacheEntry>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl EphemeralCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let value = {
            let entry = self.entries.get(key)?;
            if entry.is_expired(now) {
                None
            } else {
                Some(entry.value.clone())
            }
        };

        match value {
            Some(value) => match serde_json::from_value(value) {
                Ok(decoded) => Some(decoded),
                Err(e) => {
                    warn!(key = %key, error = %e, "dropping undecodable cache entry");
                    self.entries.remove(key);
                    None
                }
            },
            None => {
                self.entries.remove_if(key, |_, entry| entry.is_expired(now));
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| AppError::Cache(format!("failed to encode {}: {}", key, e)))?;

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    pub fn del(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every key starting with `pattern`. A trailing `*` is accepted
    /// and ignored, so `posts:list:*` and `posts:list:` are equivalent.
    pub fn del_by_prefix(&self, pattern: &str) -> usize {
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        before.saturating_sub(self.entries.len())
    }

    /// Atomically claim `key` for `ttl`. Returns false if a live entry
    /// already holds it.
    pub fn insert_if_absent(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let fresh = CacheEntry {
            value: Value::Bool(true),
            expires_at: now + ttl,
        };

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(fresh);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                true
            }
        }
    }

    /// Drop expired entries, returning how many were removed
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start the periodic sweep. The task holds only a weak reference and
    /// ends on its own once the cache is dropped.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let removed = cache.sweep();
                if removed > 0 {
                    debug!(removed, remaining = cache.len(), "cache sweep");
                }
            }
        });

        if let Ok(mut sweeper) = self.sweeper.lock() {
            if let Some(previous) = sweeper.replace(handle) {
                previous.abort();
            }
        }
    }

    /// Stop the sweeper and drop every entry
    pub fn shutdown(&self) {
        if let Ok(mut sweeper) = self.sweeper.lock() {
            if let Some(handle) = sweeper.take() {
                handle.abort();
            }
        }
        self.entries.clear();
    }
}
