//! Server hostname resolution
//!
//! The client resolves the active server's host before every send. The default
//! [`CachingResolver`] keeps answers for a fixed time so the system resolver is
//! not hit once per lookup.

use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Resolves a server hostname to the address queries are sent to
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `host` (a hostname or an IP literal)
    async fn resolve(&self, host: &str) -> Result<IpAddr>;
}

/// Resolver backed by the system resolver with a TTL cache
pub struct CachingResolver {
    max_age: Duration,
    cache: Mutex<LruCache<String, (IpAddr, Instant)>>,
}

impl CachingResolver {
    /// Create a resolver caching up to `capacity` hosts for `max_age` each
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            max_age,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    async fn lookup_system(host: &str) -> Result<IpAddr> {
        let addrs: Vec<IpAddr> = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| Error::Resolution {
                host: host.to_string(),
                message: e.to_string(),
            })?
            .map(|addr| addr.ip())
            .collect();

        // The client socket is IPv4, so prefer IPv4 answers
        addrs
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| Error::Resolution {
                host: host.to_string(),
                message: "no addresses found".into(),
            })
    }
}

#[async_trait]
impl Resolver for CachingResolver {
    async fn resolve(&self, host: &str) -> Result<IpAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }

        let key = host.to_lowercase();
        {
            let mut cache = self.cache.lock().await;
            if let Some((ip, resolved_at)) = cache.get(&key) {
                if resolved_at.elapsed() < self.max_age {
                    return Ok(*ip);
                }
                cache.pop(&key);
            }
        }

        let ip = Self::lookup_system(host).await?;
        log::debug!("resolved {} to {}", host, ip);

        self.cache.lock().await.put(key, (ip, Instant::now()));
        Ok(ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_ip_literal_passthrough() {
        let resolver = CachingResolver::new(2, Duration::from_secs(60));
        assert_eq!(
            resolver.resolve("10.1.2.3").await.unwrap(),
            IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))
        );
        assert!(resolver.resolve("::1").await.unwrap().is_ipv6());
    }

    #[tokio::test]
    async fn test_localhost_resolves() {
        let resolver = CachingResolver::new(2, Duration::from_secs(60));
        let ip = resolver.resolve("localhost").await.unwrap();
        assert!(ip.is_loopback());

        // served from the cache the second time
        assert_eq!(resolver.resolve("LOCALHOST").await.unwrap(), ip);
        assert_eq!(resolver.cache.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unresolvable_host() {
        let resolver = CachingResolver::new(2, Duration::from_secs(60));
        let err = resolver.resolve("does-not-exist.invalid").await.unwrap_err();
        assert!(matches!(err, Error::Resolution { ref host, .. } if host == "does-not-exist.invalid"));
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let resolver = CachingResolver::new(0, Duration::from_secs(1));
        assert_eq!(resolver.cache.try_lock().unwrap().cap().get(), 1);
    }
}
