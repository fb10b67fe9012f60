//! Error types for NetAcuity lookups

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during NetAcuity operations
///
/// Errors are `Clone` so that every caller attached to a shared cache load
/// receives the same outcome.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Invalid client configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to parse configuration file
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Operation attempted on a closing or closed client
    #[error("netacuity: client closed")]
    Closed,

    /// Server hostname could not be resolved
    #[error("failed to resolve {host}: {message}")]
    Resolution { host: String, message: String },

    /// Datagram could not be sent
    #[error("failed to send query: {0}")]
    Send(String),

    /// No matching response before the deadline
    #[error("netacuity: request timeout after {0:?}")]
    Timeout(Duration),

    /// The server answered with an error
    #[error("netacuity: {0}")]
    Upstream(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// Protocol error
    #[error("protocol error: {0}")]
    Protocol(#[from] netacuity_protocol::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl Error {
    /// Check if a later call may succeed where this one failed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::Send(_) | Error::Resolution { .. } | Error::Upstream(_)
        )
    }

    /// Check if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_) | Error::ConfigParse(_))
    }

    /// Check if this is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(Error::Timeout(Duration::from_millis(50)).is_recoverable());
        assert!(Error::Upstream("bad ip".into()).is_recoverable());
        assert!(!Error::Closed.is_recoverable());
        assert!(Error::Config("no servers".into()).is_config_error());
        assert!(!Error::Closed.is_config_error());
    }

    #[test]
    fn test_upstream_message() {
        let err = Error::Upstream("invalid ip address".into());
        assert_eq!(err.to_string(), "netacuity: invalid ip address");
    }

    #[test]
    fn test_io_error_is_clone() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::AddrInUse, "busy").into();
        let copy = err.clone();
        assert!(matches!(copy, Error::Io(_)));
    }
}
