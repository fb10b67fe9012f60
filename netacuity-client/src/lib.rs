//! netacuity-client - async client for NetAcuity Edge lookups
//!
//! This crate talks to one or more NetAcuity servers over UDP:
//! - Queries share one socket and are matched to responses by transaction id
//! - Every lookup is bounded by a timeout
//! - Repeated timeouts against the active server fail over to the next one
//! - [`NetAcuityCache`] keeps successful records for a while and collapses
//!   concurrent lookups of the same address into one request
//!
//! # Example
//!
//! ```no_run
//! use netacuity_client::{ClientConfig, NetAcuityCache, NetAcuityClient, ServerConfig};
//!
//! # async fn example() -> netacuity_client::Result<()> {
//! let mut config = ClientConfig::new(vec![
//!     ServerConfig::new("na1.example.com", 5400),
//!     ServerConfig::new("na2.example.com", 5400),
//! ]);
//! config.timeout = 250;
//!
//! // Direct lookups
//! let client = NetAcuityClient::new(&config).await?;
//! let record = client.lookup("8.8.8.8").await?;
//! println!("{} is in {}", record.ip, record.country);
//! client.close().await?;
//!
//! // Or through the cache
//! let cache = NetAcuityCache::new(&config).await?;
//! let record = cache.get("8.8.8.8").await?;
//! println!("{} is in {}", record.ip, record.city);
//! cache.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Failover
//!
//! A server is abandoned once `failover_threshold` timeouts happen within
//! `failover_window` of each other. Servers are tried in configuration order and
//! the list wraps around.

mod cache;
mod client;
mod config;
pub mod error;
mod failover;
pub mod mock;
mod resolver;
mod transaction;

pub use cache::{CacheStats, Lookup, NetAcuityCache};
pub use client::{ClientState, NetAcuityClient};
pub use config::{
    CacheConfig, ClientConfig, DnsConfig, ServerConfig, DEFAULT_APP_ID, DEFAULT_LISTEN_PORT,
    DEFAULT_SERVER_PORT, DEFAULT_TIMEOUT_MS,
};
pub use error::{Error, Result};
pub use failover::{ActiveServer, ServerEndpoint};
pub use netacuity_protocol::{EdgeQuery, EdgeRecord};
pub use resolver::{CachingResolver, Resolver};
