//! Bounded message cache
//!
//! Message payloads are cached by id so assembling a conversation path
//! does not hit storage for every node. The cache is bounded two ways:
//! a capacity with least-recently-used eviction, and an absolute
//! time-to-live measured from insertion.
//!
//! Expiry is lazy: an expired entry behaves as absent but stays resident
//! until [`MessageCache::sweep_expired`] removes it, either on demand or
//! from the periodic [`CacheSweeper`] task. Cache failures are never
//! fatal to chat flow; callers fall back to storage.
//!
//! # Metrics
//!
//! - `message_cache_hits_total`: Counter of gets served from the cache
//! - `message_cache_misses_total`: Counter of gets that missed or hit
//!   an expired entry
//! - `message_cache_evictions_total`: Counter of LRU evictions
//! - `message_cache_swept_total`: Counter of entries removed by sweeps

use crate::config::CacheConfig;
use crate::error::{Result, TangentError};
use crate::message::MessageRecord;
use metrics::{counter, increment_counter};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug)]
struct CacheEntry {
    record: MessageRecord,
    inserted_at: Instant,
    last_used: u64,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    tick: u64,
}

impl CacheInner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

/// Thread-safe LRU + TTL cache for message payloads.
///
/// Shared process-wide behind an [`Arc`]; all methods take `&self`.
#[derive(Debug)]
pub struct MessageCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    ttl: Duration,
}

impl MessageCache {
    /// Creates a cache with the given bounds.
    ///
    /// # Errors
    ///
    /// Returns [`TangentError::Validation`] when `capacity` is zero or
    /// `ttl` is not positive.
    pub fn new(capacity: usize, ttl: Duration) -> Result<Self> {
        if capacity == 0 {
            return Err(TangentError::Validation(
                "cache capacity must be at least 1".to_string(),
            ));
        }
        if ttl.is_zero() {
            return Err(TangentError::Validation(
                "cache ttl must be positive".to_string(),
            ));
        }
        Ok(Self {
            inner: Mutex::new(CacheInner::default()),
            capacity,
            ttl,
        })
    }

    /// Creates a cache from a [`CacheConfig`].
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        Self::new(config.capacity, config.ttl())
    }

    /// Creates a cache with the default bounds (capacity 1000, TTL 1h).
    pub fn with_defaults() -> Self {
        let config = CacheConfig::default();
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity: config.capacity,
            ttl: config.ttl(),
        }
    }

    /// Looks up a message payload by id.
    ///
    /// A hit refreshes the entry's recency. An expired entry behaves as
    /// absent and is left untouched: neither its recency nor its TTL is
    /// refreshed by the failed lookup.
    pub fn get(&self, id: &str) -> Option<MessageRecord> {
        self.get_at(id, Instant::now())
    }

    fn get_at(&self, id: &str, now: Instant) -> Option<MessageRecord> {
        let Ok(mut inner) = self.inner.lock() else {
            return None;
        };
        let expired = match inner.entries.get(id) {
            None => {
                increment_counter!("message_cache_misses_total");
                return None;
            }
            Some(entry) => self.is_expired(entry, now),
        };
        if expired {
            increment_counter!("message_cache_misses_total");
            return None;
        }
        let tick = inner.next_tick();
        let entry = inner.entries.get_mut(id)?;
        entry.last_used = tick;
        increment_counter!("message_cache_hits_total");
        Some(entry.record.clone())
    }

    /// Inserts or replaces a payload under its message id.
    ///
    /// Replacing an id is a fresh insert: the TTL restarts. Inserting a
    /// new id at capacity evicts the least-recently-used entry first.
    pub fn set(&self, record: MessageRecord) {
        self.set_at(record, Instant::now());
    }

    fn set_at(&self, record: MessageRecord, now: Instant) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let tick = inner.next_tick();
        let id = record.id.clone();
        if !inner.entries.contains_key(&id) && inner.entries.len() >= self.capacity {
            let victim = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            if let Some(victim) = victim {
                inner.entries.remove(&victim);
                increment_counter!("message_cache_evictions_total");
            }
        }
        inner.entries.insert(
            id,
            CacheEntry {
                record,
                inserted_at: now,
                last_used: tick,
            },
        );
    }

    /// Whether a live (non-expired) entry exists for this id.
    ///
    /// Does not refresh recency.
    pub fn exists(&self, id: &str) -> bool {
        self.exists_at(id, Instant::now())
    }

    fn exists_at(&self, id: &str, now: Instant) -> bool {
        let Ok(inner) = self.inner.lock() else {
            return false;
        };
        inner
            .entries
            .get(id)
            .map(|entry| !self.is_expired(entry, now))
            .unwrap_or(false)
    }

    /// Physically removes an entry. Returns whether one was resident.
    pub fn remove(&self, id: &str) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };
        inner.entries.remove(id).is_some()
    }

    /// Physically removes every expired entry, returning how many went.
    ///
    /// # Errors
    ///
    /// Returns [`TangentError::Cache`] when the cache lock is poisoned.
    pub fn sweep_expired(&self) -> Result<usize> {
        self.sweep_expired_at(Instant::now())
    }

    fn sweep_expired_at(&self, now: Instant) -> Result<usize> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| TangentError::Cache("cache lock poisoned".to_string()))?;
        let before = inner.entries.len();
        let ttl = self.ttl;
        inner
            .entries
            .retain(|_, entry| now.duration_since(entry.inserted_at) < ttl);
        let swept = before - inner.entries.len();
        if swept > 0 {
            counter!("message_cache_swept_total", swept as u64);
        }
        Ok(swept)
    }

    /// Number of resident entries, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    /// Whether no entries are resident.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.duration_since(entry.inserted_at) >= self.ttl
    }
}

/// Periodic background sweep of expired cache entries.
///
/// The task is owned by whoever spawns it; nothing in the engine starts
/// one implicitly. Sweep failures are logged and the loop keeps running.
/// Dropping the handle cancels the task; [`shutdown`](Self::shutdown)
/// cancels and joins.
#[derive(Debug)]
pub struct CacheSweeper {
    token: CancellationToken,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl CacheSweeper {
    /// Spawns the sweep loop on the current tokio runtime.
    pub fn spawn(cache: Arc<MessageCache>, interval: Duration) -> Self {
        let token = CancellationToken::new();
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            debug!(interval_ms = interval.as_millis() as u64, "cache sweeper started");
            loop {
                tokio::select! {
                    biased;

                    _ = loop_token.cancelled() => {
                        debug!("cache sweeper stopping");
                        break;
                    }

                    _ = tokio::time::sleep(interval) => {
                        match cache.sweep_expired() {
                            Ok(0) => {}
                            Ok(swept) => debug!(swept, "expired cache entries removed"),
                            Err(e) => warn!(error = %e, "cache sweep failed"),
                        }
                    }
                }
            }
        });
        Self {
            token,
            handle: Some(handle),
        }
    }

    /// Requests cancellation without waiting for the task to finish.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancels the sweep loop and waits for it to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
