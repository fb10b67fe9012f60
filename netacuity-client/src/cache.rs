//! Record cache with TTL expiration and single-flight loading
//!
//! ```text
//! get("1.2.3.4") ─┐
//!                 │                            ┌───────────┐
//! get("1.2.3.4") ─┼──► NetAcuityCache ──miss──►│ one load  │──► upstream.lookup()
//!                 │       │    ▲               └─────┬─────┘
//! get("1.2.3.4") ─┘       │    └── broadcast ────────┘
//!                         └──hit──► cached EdgeRecord
//! ```
//!
//! Successful records are kept in an LRU for `max_age`. Failures are handed to
//! every waiting caller but never stored, so the next `get` tries again.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use netacuity_protocol::EdgeRecord;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;

use crate::client::NetAcuityClient;
use crate::config::{CacheConfig, ClientConfig};
use crate::error::{Error, Result};

/// Something that can perform an Edge lookup
///
/// Implemented by [`NetAcuityClient`]; the cache is generic over it.
#[async_trait]
pub trait Lookup: Send + Sync {
    /// Look up an address
    async fn lookup(&self, address: &str) -> Result<EdgeRecord>;

    /// Release the upstream's resources
    async fn close(&self) -> Result<()>;
}

/// Counters since the last call to [`NetAcuityCache::stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Calls to `get`
    pub gets: u64,
    /// Lookups sent upstream
    pub loads: u64,
}

impl CacheStats {
    /// Fraction of `get` calls that did not trigger an upstream lookup
    pub fn hit_ratio(&self) -> f64 {
        if self.gets == 0 {
            0.0
        } else {
            1.0 - self.loads as f64 / self.gets as f64
        }
    }
}

/// Cached lookup result
#[derive(Debug, Clone)]
struct CacheEntry {
    record: EdgeRecord,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(record: EdgeRecord, ttl: Duration) -> Self {
        Self {
            record,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

type LoadResult = Result<EdgeRecord>;

struct CacheState {
    entries: LruCache<String, CacheEntry>,
    /// Loads in progress: key -> channel every waiter subscribes to
    loading: HashMap<String, broadcast::Sender<LoadResult>>,
}

/// Caching front for a NetAcuity client
pub struct NetAcuityCache<L = NetAcuityClient> {
    upstream: Arc<L>,
    state: Arc<Mutex<CacheState>>,
    max_age: Duration,
    gets: AtomicU64,
    loads: AtomicU64,
}

impl NetAcuityCache<NetAcuityClient> {
    /// Create a client from `config` and cache its results with `config.cache`
    pub async fn new(config: &ClientConfig) -> Result<Self> {
        let client = NetAcuityClient::new(config).await?;
        Self::with_upstream(client, &config.cache)
    }
}

impl<L: Lookup + 'static> NetAcuityCache<L> {
    /// Cache results of an arbitrary upstream
    pub fn with_upstream(upstream: L, config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.max)
            .ok_or_else(|| Error::Config("cache.max must be at least 1".into()))?;

        Ok(Self {
            upstream: Arc::new(upstream),
            state: Arc::new(Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                loading: HashMap::new(),
            })),
            max_age: config.max_age(),
            gets: AtomicU64::new(0),
            loads: AtomicU64::new(0),
        })
    }

    /// Look up an address, serving from the cache when possible
    ///
    /// Concurrent calls for the same address share a single upstream lookup.
    pub async fn get(&self, address: &str) -> Result<EdgeRecord> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        let key = normalize(address);

        let mut waiter = {
            let mut state = self.state.lock().await;

            if let Some(entry) = state.entries.get(&key) {
                if !entry.is_expired() {
                    log::debug!("NetAcuity cache hit for {}", key);
                    return Ok(entry.record.clone());
                }
                state.entries.pop(&key);
            }

            match state.loading.get(&key) {
                Some(load) => {
                    log::debug!("Joining NetAcuity lookup in progress for {}", key);
                    load.subscribe()
                }
                None => {
                    log::debug!("NetAcuity cache miss for {}", key);
                    let (load, waiter) = broadcast::channel(1);
                    state.loading.insert(key.clone(), load);
                    self.spawn_load(key);
                    waiter
                }
            }
        };

        // The load task always reports before dropping its sender, unless the
        // runtime is shutting down.
        waiter.recv().await.unwrap_or(Err(Error::Closed))
    }

    /// Drop every cached record; loads in progress still complete
    pub async fn reset(&self) {
        self.state.lock().await.entries.clear();
    }

    /// Close the upstream
    pub async fn close(&self) -> Result<()> {
        self.upstream.close().await
    }

    /// Counters since the previous call, resetting them
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            gets: self.gets.swap(0, Ordering::Relaxed),
            loads: self.loads.swap(0, Ordering::Relaxed),
        }
    }

    /// Number of cached records (expired ones included until they are read)
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Check if no records are cached
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// The wrapped upstream
    pub fn upstream(&self) -> &L {
        &self.upstream
    }

    /// Run the upstream lookup for `key` in its own task so the shared result is
    /// produced even if the caller that started it goes away.
    fn spawn_load(&self, key: String) {
        self.loads.fetch_add(1, Ordering::Relaxed);

        let upstream = self.upstream.clone();
        let state = self.state.clone();
        let max_age = self.max_age;

        tokio::spawn(async move {
            let result = upstream.lookup(&key).await;

            let mut state = state.lock().await;
            match &result {
                Ok(record) => {
                    state
                        .entries
                        .put(key.clone(), CacheEntry::new(record.clone(), max_age));
                }
                Err(e) => log::debug!("NetAcuity lookup for {} failed: {}", key, e),
            }

            if let Some(load) = state.loading.remove(&key) {
                // No receivers left is fine: every caller gave up waiting.
                let _ = load.send(result);
            }
        });
    }
}

/// Cache key for an address
fn normalize(address: &str) -> String {
    address.trim().to_lowercase()
}
