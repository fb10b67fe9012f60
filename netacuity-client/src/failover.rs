//! Sliding-window failover across the configured servers
//!
//! UDP has no connection state, so a timeout is only a hint that a server is
//! gone. A server is abandoned once `threshold` timeouts land within `window`
//! of each other; the next server in the list (wrapping around) becomes active.
//! Requests already sent to the old server may still time out after the switch.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::ServerConfig;

/// A NetAcuity server and its timeout bookkeeping
#[derive(Debug, Clone)]
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,
    /// When the last timeout against this server happened
    pub last_timeout_at: Option<Instant>,
    /// Timeouts counted in the current window
    pub error_count: u32,
}

impl ServerEndpoint {
    fn new(server: &ServerConfig) -> Self {
        Self {
            host: server.host.clone(),
            port: server.port,
            last_timeout_at: None,
            error_count: 0,
        }
    }
}

/// The server a request is sent to, captured at send time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveServer {
    pub index: usize,
    pub host: String,
    pub port: u16,
}

pub(crate) struct FailoverTracker {
    servers: Vec<ServerEndpoint>,
    current: usize,
    window: Duration,
    threshold: u32,
}

impl FailoverTracker {
    /// `servers` must not be empty (enforced by config validation)
    pub(crate) fn new(servers: &[ServerConfig], window: Duration, threshold: u32) -> Self {
        Self {
            servers: servers.iter().map(ServerEndpoint::new).collect(),
            current: 0,
            window,
            threshold,
        }
    }

    pub(crate) fn active(&self) -> ActiveServer {
        let server = &self.servers[self.current];
        ActiveServer {
            index: self.current,
            host: server.host.clone(),
            port: server.port,
        }
    }

    pub(crate) fn servers(&self) -> &[ServerEndpoint] {
        &self.servers
    }

    /// Record a timeout against the server at `targeted`
    ///
    /// Ignored unless `targeted` is still the active server, so timeouts of
    /// requests sent before a failover do not count against the new server.
    /// Returns the index of the newly active server when a failover happened.
    pub(crate) fn record_timeout(&mut self, targeted: usize, now: Instant) -> Option<usize> {
        if targeted != self.current {
            return None;
        }

        let window = self.window;
        let threshold = self.threshold;
        let server = &mut self.servers[targeted];
        let mut failed_over = false;

        match server.last_timeout_at {
            Some(last) if now.saturating_duration_since(last) < window => {
                server.error_count += 1;
                failed_over = server.error_count >= threshold;
            }
            _ => server.error_count = 1,
        }
        server.last_timeout_at = Some(now);

        if failed_over {
            self.current = (self.current + 1) % self.servers.len();
            Some(self.current)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(count: usize, window_ms: u64, threshold: u32) -> FailoverTracker {
        let servers: Vec<ServerConfig> = (0..count)
            .map(|i| ServerConfig::new(format!("host{}", i), 5400 + i as u16))
            .collect();
        FailoverTracker::new(&servers, Duration::from_millis(window_ms), threshold)
    }

    #[test]
    fn test_starts_on_first_server() {
        let tracker = tracker(3, 1000, 5);
        assert_eq!(
            tracker.active(),
            ActiveServer {
                index: 0,
                host: "host0".into(),
                port: 5400
            }
        );
    }

    #[test]
    fn test_failover_after_threshold_within_window() {
        let mut tracker = tracker(2, 200, 2);
        let start = Instant::now();

        assert_eq!(tracker.record_timeout(0, start), None);
        assert_eq!(tracker.servers()[0].error_count, 1);

        assert_eq!(
            tracker.record_timeout(0, start + Duration::from_millis(50)),
            Some(1)
        );
        assert_eq!(tracker.active().index, 1);
        assert_eq!(tracker.active().host, "host1");
    }

    #[test]
    fn test_timeouts_outside_window_reset_count() {
        let mut tracker = tracker(2, 200, 2);
        let start = Instant::now();

        assert_eq!(tracker.record_timeout(0, start), None);
        assert_eq!(
            tracker.record_timeout(0, start + Duration::from_millis(300)),
            None
        );
        assert_eq!(tracker.servers()[0].error_count, 1);
        assert_eq!(tracker.active().index, 0);
        assert_eq!(
            tracker.servers()[0].last_timeout_at,
            Some(start + Duration::from_millis(300))
        );
    }

    #[test]
    fn test_stale_target_ignored() {
        let mut tracker = tracker(2, 1000, 1);
        let now = Instant::now();

        // first timeout only opens the window
        assert_eq!(tracker.record_timeout(0, now), None);
        assert_eq!(tracker.record_timeout(0, now), Some(1));

        // a request that was sent to server 0 before the switch times out late
        assert_eq!(tracker.record_timeout(0, now), None);
        assert_eq!(tracker.active().index, 1);
        assert_eq!(tracker.servers()[1].error_count, 0);
    }

    #[test]
    fn test_wraps_to_first_server() {
        let mut tracker = tracker(2, 1000, 2);
        let now = Instant::now();

        tracker.record_timeout(0, now);
        assert_eq!(tracker.record_timeout(0, now), Some(1));

        tracker.record_timeout(1, now);
        assert_eq!(tracker.record_timeout(1, now), Some(0));
        assert_eq!(tracker.active().index, 0);
    }

    #[test]
    fn test_counts_kept_after_failover() {
        let mut tracker = tracker(2, 1000, 2);
        let now = Instant::now();

        tracker.record_timeout(0, now);
        tracker.record_timeout(0, now);
        assert_eq!(tracker.servers()[0].error_count, 2);
    }

    #[test]
    fn test_single_server_stays_active() {
        let mut tracker = tracker(1, 1000, 1);
        let now = Instant::now();

        tracker.record_timeout(0, now);
        assert_eq!(tracker.record_timeout(0, now), Some(0));
        assert_eq!(tracker.active().index, 0);
    }
}
