//! Client configuration
//!
//! Configuration is plain data, usually loaded from TOML:
//!
//! ```toml
//! port = 10000
//! timeout = 100
//! app_id = 2
//! failover_window = 1000
//! failover_threshold = 5
//!
//! [[servers]]
//! host = "na1.example.com"
//! port = 5400
//!
//! [[servers]]
//! host = "na2.example.com"
//!
//! [dns]
//! max_age = 120000
//!
//! [cache]
//! max = 10000
//! max_age = 600000
//! ```
//!
//! All durations are in milliseconds. Everything except `servers` is optional.

use std::path::Path;
use std::time::Duration;

use netacuity_protocol::MAX_APP_ID;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default local port responses are received on
pub const DEFAULT_LISTEN_PORT: u16 = 10000;

/// Default port of a NetAcuity server
pub const DEFAULT_SERVER_PORT: u16 = 5400;

/// Default response timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Default application id reported to NetAcuity
pub const DEFAULT_APP_ID: u8 = 2;

/// Default failover window in milliseconds
pub const DEFAULT_FAILOVER_WINDOW_MS: u64 = 1000;

/// Default number of timeouts within the window that trigger a failover
pub const DEFAULT_FAILOVER_THRESHOLD: u32 = 5;

/// Default lifetime of resolved server addresses in milliseconds
pub const DEFAULT_DNS_MAX_AGE_MS: u64 = 2 * 60 * 1000;

/// Default maximum number of cached records
pub const DEFAULT_CACHE_MAX: usize = 10_000;

/// Default lifetime of cached records in milliseconds
pub const DEFAULT_CACHE_MAX_AGE_MS: u64 = 10 * 60 * 1000;

fn default_listen_port() -> u16 {
    DEFAULT_LISTEN_PORT
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_app_id() -> u8 {
    DEFAULT_APP_ID
}

fn default_failover_window() -> u64 {
    DEFAULT_FAILOVER_WINDOW_MS
}

fn default_failover_threshold() -> u32 {
    DEFAULT_FAILOVER_THRESHOLD
}

fn default_dns_max_age() -> u64 {
    DEFAULT_DNS_MAX_AGE_MS
}

fn default_cache_max() -> usize {
    DEFAULT_CACHE_MAX
}

fn default_cache_max_age() -> u64 {
    DEFAULT_CACHE_MAX_AGE_MS
}

/// Configuration for a [`NetAcuityClient`](crate::NetAcuityClient) and the cache around it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Local UDP port to send from and receive responses on (0 = any free port)
    #[serde(default = "default_listen_port")]
    pub port: u16,

    /// Response timeout
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Application id (0-127) used to split out usage in NetAcuity reporting
    #[serde(default = "default_app_id")]
    pub app_id: u8,

    /// Time span in which repeated timeouts count towards a failover
    #[serde(default = "default_failover_window")]
    pub failover_window: u64,

    /// Number of timeouts within `failover_window` that switch to the next server
    #[serde(default = "default_failover_threshold")]
    pub failover_threshold: u32,

    /// NetAcuity servers, in failover order
    #[serde(default)]
    pub servers: Vec<ServerConfig>,

    /// Server hostname resolution settings
    #[serde(default)]
    pub dns: DnsConfig,

    /// Record cache settings (used by [`NetAcuityCache`](crate::NetAcuityCache))
    #[serde(default)]
    pub cache: CacheConfig,
}

/// A single NetAcuity server entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname or IP address
    #[serde(default)]
    pub host: String,

    /// UDP port
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl ServerConfig {
    /// Create a server entry
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// Settings for resolving server hostnames
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// How long a resolved address is reused
    #[serde(default = "default_dns_max_age")]
    pub max_age: u64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            max_age: default_dns_max_age(),
        }
    }
}

impl DnsConfig {
    /// Lifetime of a resolved address
    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age)
    }
}

/// Settings for the record cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached records
    #[serde(default = "default_cache_max")]
    pub max: usize,

    /// How long a successful lookup is served from the cache
    #[serde(default = "default_cache_max_age")]
    pub max_age: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max: default_cache_max(),
            max_age: default_cache_max_age(),
        }
    }
}

impl CacheConfig {
    /// Lifetime of a cached record
    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age)
    }

    /// Validate cache settings
    pub fn validate(&self) -> Result<()> {
        if self.max == 0 {
            return Err(Error::Config("cache.max must be at least 1".into()));
        }
        Ok(())
    }
}

impl ClientConfig {
    /// Create a configuration for the given servers with default settings
    pub fn new(servers: Vec<ServerConfig>) -> Self {
        Self {
            port: default_listen_port(),
            timeout: default_timeout(),
            app_id: default_app_id(),
            failover_window: default_failover_window(),
            failover_threshold: default_failover_threshold(),
            servers,
            dns: DnsConfig::default(),
            cache: CacheConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(Error::Config("at least one server is required".into()));
        }

        for (index, server) in self.servers.iter().enumerate() {
            if server.host.trim().is_empty() {
                return Err(Error::Config(format!(
                    "invalid host in servers entry {}",
                    index
                )));
            }
        }

        if self.app_id > MAX_APP_ID {
            return Err(Error::Config(format!(
                "app_id {} is out of range (0-{})",
                self.app_id, MAX_APP_ID
            )));
        }

        if self.timeout == 0 {
            return Err(Error::Config("timeout must be greater than 0".into()));
        }

        if self.failover_threshold == 0 {
            return Err(Error::Config(
                "failover_threshold must be greater than 0".into(),
            ));
        }

        self.cache.validate()
    }

    /// Response timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    /// Failover window
    pub fn failover_window(&self) -> Duration {
        Duration::from_millis(self.failover_window)
    }

    /// Generate a sample configuration
    pub fn sample() -> String {
        r#"# NetAcuity client configuration

# Local UDP port used to send queries and receive responses (0 = any free port)
port = 10000

# Response timeout in milliseconds
timeout = 100

# Application id (0-127) reported to NetAcuity
app_id = 2

# If failover_threshold timeouts happen within failover_window milliseconds
# the next server in the list becomes the active one
failover_window = 1000
failover_threshold = 5

# Servers in failover order (port defaults to 5400)
[[servers]]
host = "netacuity1.example.com"
port = 5400

[[servers]]
host = "netacuity2.example.com"

[dns]
# How long resolved server addresses are reused, in milliseconds
max_age = 120000

[cache]
# Maximum number of cached records and their lifetime in milliseconds
max = 10000
max_age = 600000
"#
        .to_string()
    }
}
