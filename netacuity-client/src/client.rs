//! NetAcuity UDP client
//!
//! One UDP socket carries every query. Each [`NetAcuityClient::lookup`] call
//! registers a transaction under a random id, sends the query to the active
//! server and waits for one of three outcomes:
//!
//! - a response carrying the same transaction id (delivered by the receive loop)
//! - the request deadline, which counts against the server for failover
//! - an immediate resolution or send failure
//!
//! Deadlines run in their own timer tasks, so a lookup future that is dropped
//! early still has its transaction expired and its timeout counted.
//! Responses are correlated only by transaction id, never by arrival order.
//! Datagrams that do not decode, or whose transaction is no longer in flight,
//! are dropped.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netacuity_protocol::{decode_response, EdgeQuery, EdgeRecord};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::cache::Lookup;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::failover::{ActiveServer, FailoverTracker, ServerEndpoint};
use crate::resolver::{CachingResolver, Resolver};
use crate::transaction::TransactionTable;

/// Maximum UDP payload; anything shorter would truncate large responses
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Extra time `close` waits on top of two request timeouts
const CLOSE_GRACE: Duration = Duration::from_millis(50);

/// Lifecycle of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Accepting lookups
    Open,
    /// Socket released, waiting for in-flight lookups to drain
    Closing,
    /// Fully shut down
    Closed,
}

struct Lifecycle {
    state: ClientState,
    socket: Option<Arc<UdpSocket>>,
    receiver: Option<JoinHandle<()>>,
}

/// Client for NetAcuity Edge lookups over UDP
pub struct NetAcuityClient {
    app_id: u8,
    timeout: Duration,
    local_addr: SocketAddr,
    resolver: Arc<dyn Resolver>,
    lifecycle: Mutex<Lifecycle>,
    transactions: Arc<Mutex<TransactionTable>>,
    failover: Arc<Mutex<FailoverTracker>>,
}

impl NetAcuityClient {
    /// Create a client using the system resolver for server hostnames
    ///
    /// Binds the listen port from the configuration and starts receiving
    /// responses. Must be called from within a tokio runtime.
    pub async fn new(config: &ClientConfig) -> Result<Self> {
        let resolver = CachingResolver::new(config.servers.len() + 1, config.dns.max_age());
        Self::with_resolver(config, Arc::new(resolver)).await
    }

    /// Create a client with a custom hostname resolver
    pub async fn with_resolver(config: &ClientConfig, resolver: Arc<dyn Resolver>) -> Result<Self> {
        config.validate()?;

        let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port))).await?;
        let local_addr = socket.local_addr()?;
        let socket = Arc::new(socket);

        let transactions = Arc::new(Mutex::new(TransactionTable::new()));
        let receiver = tokio::spawn(receive_loop(socket.clone(), transactions.clone()));

        log::info!(
            "NetAcuity client listening on {} with {} servers, timeout {:?}",
            local_addr,
            config.servers.len(),
            config.timeout()
        );

        Ok(Self {
            app_id: config.app_id,
            timeout: config.timeout(),
            local_addr,
            resolver,
            lifecycle: Mutex::new(Lifecycle {
                state: ClientState::Open,
                socket: Some(socket),
                receiver: Some(receiver),
            }),
            transactions,
            failover: Arc::new(Mutex::new(FailoverTracker::new(
                &config.servers,
                config.failover_window(),
                config.failover_threshold,
            ))),
        })
    }

    /// Look up an address on the active server
    ///
    /// A response whose `error` field is set is returned as [`Error::Upstream`].
    pub async fn lookup(&self, address: &str) -> Result<EdgeRecord> {
        self.ensure_open().await?;
        let server = self.failover.lock().await.active();

        let (transaction_id, mut response) = self.transactions.lock().await.register();
        self.spawn_deadline(transaction_id.clone(), server.clone());

        // The deadline also bounds a slow hostname resolution
        let completed = tokio::select! {
            sent = self.send(address, &transaction_id, &server) => {
                if let Err(e) = sent {
                    self.transactions.lock().await.remove(&transaction_id);
                    return Err(e);
                }
                None
            }
            result = &mut response => Some(result),
        };
        let result = match completed {
            Some(result) => result,
            None => response.await,
        };

        // Completion dropped: the client was shut down
        let record = result.map_err(|_| Error::Closed)??;

        if record.is_error() {
            return Err(Error::Upstream(record.error));
        }
        Ok(record)
    }

    /// Shut the client down
    ///
    /// The socket is released immediately, so no further queries are sent and no
    /// responses are received. The call then waits twice the request timeout
    /// (plus a short grace period) so lookups already in flight run out and
    /// finish normally. Fails with [`Error::Closed`] if the client is not open.
    pub async fn close(&self) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle.lock().await;
            if lifecycle.state != ClientState::Open {
                return Err(Error::Closed);
            }
            lifecycle.state = ClientState::Closing;
            lifecycle.socket = None;
            if let Some(receiver) = lifecycle.receiver.take() {
                receiver.abort();
            }
        }

        log::info!("Closing NetAcuity client on {}", self.local_addr);
        tokio::time::sleep(self.timeout * 2 + CLOSE_GRACE).await;

        let abandoned = self.transactions.lock().await.clear();
        if abandoned > 0 {
            log::debug!("dropped {} transactions still pending after close", abandoned);
        }

        self.lifecycle.lock().await.state = ClientState::Closed;
        Ok(())
    }

    /// Current lifecycle state
    pub async fn state(&self) -> ClientState {
        self.lifecycle.lock().await.state
    }

    /// Local address of the client socket
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Server new lookups are sent to
    pub async fn active_server(&self) -> ActiveServer {
        self.failover.lock().await.active()
    }

    /// Snapshot of every server and its timeout bookkeeping
    pub async fn servers(&self) -> Vec<ServerEndpoint> {
        self.failover.lock().await.servers().to_vec()
    }

    /// Number of lookups waiting for a response
    pub async fn in_flight(&self) -> usize {
        self.transactions.lock().await.len()
    }

    async fn ensure_open(&self) -> Result<()> {
        match self.lifecycle.lock().await.state {
            ClientState::Open => Ok(()),
            _ => Err(Error::Closed),
        }
    }

    async fn send(&self, address: &str, transaction_id: &str, server: &ActiveServer) -> Result<()> {
        let query = EdgeQuery::new(self.app_id, address, transaction_id)?;
        let ip = self.resolver.resolve(&server.host).await?;
        let target = SocketAddr::new(ip, server.port);

        // Held across the send so nothing leaves the socket once close has started
        let lifecycle = self.lifecycle.lock().await;
        let socket = match (lifecycle.state, &lifecycle.socket) {
            (ClientState::Open, Some(socket)) => socket,
            _ => return Err(Error::Closed),
        };

        log::debug!(
            "Sending query {} for {} to {}",
            transaction_id,
            address,
            target
        );

        socket
            .send_to(&query.encode(), target)
            .await
            .map_err(|e| Error::Send(format!("{}: {}", target, e)))?;
        Ok(())
    }

    /// Expire `transaction_id` once the request timeout has passed
    fn spawn_deadline(&self, transaction_id: String, server: ActiveServer) {
        let deadline = Instant::now() + self.timeout;
        let timeout = self.timeout;
        let transactions = self.transactions.clone();
        let failover = self.failover.clone();

        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;

            let expired = transactions.lock().await.take(&transaction_id);
            if let Some(pending) = expired {
                // Bookkeeping first, so the caller sees the failover it caused
                record_timeout(&failover, &server).await;
                pending.fail(Error::Timeout(timeout));
            }
        });
    }
}

async fn record_timeout(failover: &Mutex<FailoverTracker>, server: &ActiveServer) {
    let mut failover = failover.lock().await;
    if failover.record_timeout(server.index, Instant::now()).is_some() {
        let next = failover.active();
        log::warn!(
            "NetAcuity server {}:{} is not responding, failing over to {}:{}",
            server.host,
            server.port,
            next.host,
            next.port
        );
    }
}

impl Drop for NetAcuityClient {
    fn drop(&mut self) {
        if let Some(receiver) = self.lifecycle.get_mut().receiver.take() {
            receiver.abort();
        }
    }
}

#[async_trait]
impl Lookup for NetAcuityClient {
    async fn lookup(&self, address: &str) -> Result<EdgeRecord> {
        NetAcuityClient::lookup(self, address).await
    }

    async fn close(&self) -> Result<()> {
        NetAcuityClient::close(self).await
    }
}

/// Decode incoming datagrams and hand them to their transactions
async fn receive_loop(socket: Arc<UdpSocket>, transactions: Arc<Mutex<TransactionTable>>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                log::debug!("NetAcuity socket receive error: {}", e);
                continue;
            }
        };

        let Some(record) = decode_response(&buf[..len]) else {
            log::debug!("Ignoring {} byte datagram from {}: not a version 5 response", len, peer);
            continue;
        };

        let transaction_id = record.transaction_id.clone();
        if !transactions.lock().await.complete(record) {
            log::debug!(
                "No transaction in flight for {} (response from {})",
                transaction_id,
                peer
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn config(timeout_ms: u64) -> ClientConfig {
        let mut config = ClientConfig::new(vec![ServerConfig::new("127.0.0.1", 9)]);
        config.port = 0;
        config.timeout = timeout_ms;
        config
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client = NetAcuityClient::new(&config(50)).await.unwrap();
        assert_eq!(client.state().await, ClientState::Open);
        assert_ne!(client.local_addr().port(), 0);
        assert_eq!(client.timeout(), Duration::from_millis(50));
        assert_eq!(client.active_server().await.port, 9);
        assert_eq!(client.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_client_rejects_empty_servers() {
        let mut config = config(50);
        config.servers.clear();
        let err = NetAcuityClient::new(&config).await.err().unwrap();
        assert!(err.is_config_error());
    }

    #[tokio::test]
    async fn test_client_rejects_missing_host() {
        let mut config = config(50);
        config.servers.push(ServerConfig::new("", 5400));
        let err = NetAcuityClient::new(&config).await.err().unwrap();
        assert!(err.is_config_error());
    }

    #[tokio::test]
    async fn test_invalid_address_fails_without_waiting() {
        let client = NetAcuityClient::new(&config(1000)).await.unwrap();
        let started = Instant::now();

        let err = client.lookup("1.2.3.4;5").await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(client.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_close_twice_fails() {
        let client = NetAcuityClient::new(&config(10)).await.unwrap();

        client.close().await.unwrap();
        assert_eq!(client.state().await, ClientState::Closed);
        assert!(matches!(client.close().await, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_lookup_after_close_fails() {
        let client = NetAcuityClient::new(&config(10)).await.unwrap();
        client.close().await.unwrap();

        assert!(matches!(client.lookup("1.2.3.4").await, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_lookup_while_closing_fails() {
        let client = Arc::new(NetAcuityClient::new(&config(100)).await.unwrap());

        let closing = {
            let client = client.clone();
            tokio::spawn(async move { client.close().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(client.state().await, ClientState::Closing);
        assert!(matches!(client.lookup("1.2.3.4").await, Err(Error::Closed)));
        assert!(matches!(client.close().await, Err(Error::Closed)));

        closing.await.unwrap().unwrap();
        assert_eq!(client.state().await, ClientState::Closed);
    }
}
