//! In-process NetAcuity server for tests
//!
//! [`MockNetAcuityServer`] binds a loopback UDP port, parses every query it
//! receives and answers with whatever the responder closure returns. Replies are
//! sent from their own tasks, so a delayed reply does not hold up later ones.
//!
//! ```no_run
//! use netacuity_client::mock::{MockNetAcuityServer, MockReply};
//!
//! # async fn example() -> std::io::Result<()> {
//! let server = MockNetAcuityServer::start(|query| {
//!     let mut record = MockNetAcuityServer::answer(query);
//!     record.country = "usa".into();
//!     Some(MockReply::record(&record))
//! })
//! .await?;
//!
//! println!("mock server on {}", server.local_addr());
//! server.close().await;
//! # Ok(())
//! # }
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use netacuity_protocol::{encode_response, EdgeQuery, EdgeRecord};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

/// A datagram the mock server sends back
#[derive(Debug, Clone)]
pub struct MockReply {
    pub payload: Vec<u8>,
    pub delay: Duration,
}

impl MockReply {
    /// Encoded response for `record`, sent immediately
    pub fn record(record: &EdgeRecord) -> Self {
        Self::raw(encode_response(record))
    }

    /// Arbitrary bytes, sent immediately
    pub fn raw(payload: Vec<u8>) -> Self {
        Self {
            payload,
            delay: Duration::ZERO,
        }
    }

    /// Send the reply after `delay`
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Responder = dyn Fn(&EdgeQuery) -> Option<MockReply> + Send + Sync;

/// Loopback UDP server speaking the NetAcuity Edge protocol
pub struct MockNetAcuityServer {
    local_addr: SocketAddr,
    received: Arc<Mutex<Vec<EdgeQuery>>>,
    task: JoinHandle<()>,
}

impl MockNetAcuityServer {
    /// Start a server answering with `responder`; `None` means stay silent
    pub async fn start<F>(responder: F) -> std::io::Result<Self>
    where
        F: Fn(&EdgeQuery) -> Option<MockReply> + Send + Sync + 'static,
    {
        let socket = Arc::new(UdpSocket::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).await?);
        let local_addr = socket.local_addr()?;
        let received = Arc::new(Mutex::new(Vec::new()));

        let task = tokio::spawn(serve(socket, Arc::new(responder), received.clone()));
        log::debug!("Mock NetAcuity server listening on {}", local_addr);

        Ok(Self {
            local_addr,
            received,
            task,
        })
    }

    /// Start a server answering every query with [`MockNetAcuityServer::answer`]
    pub async fn echo() -> std::io::Result<Self> {
        Self::start(|query| Some(MockReply::record(&Self::answer(query)))).await
    }

    /// Start a server that never answers
    pub async fn silent() -> std::io::Result<Self> {
        Self::start(|_| None).await
    }

    /// Minimal successful record for `query`
    pub fn answer(query: &EdgeQuery) -> EdgeRecord {
        EdgeRecord {
            ip: query.address().to_string(),
            transaction_id: query.transaction_id().to_string(),
            ..Default::default()
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Queries received so far, in arrival order
    pub fn received(&self) -> Vec<EdgeQuery> {
        self.received
            .lock()
            .map(|received| received.clone())
            .unwrap_or_default()
    }

    /// Number of queries received so far
    pub fn received_count(&self) -> usize {
        self.received.lock().map(|received| received.len()).unwrap_or(0)
    }

    /// Stop serving and release the port
    pub async fn close(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
        log::debug!("Mock NetAcuity server on {} closed", self.local_addr);
    }
}

impl Drop for MockNetAcuityServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(socket: Arc<UdpSocket>, responder: Arc<Responder>, received: Arc<Mutex<Vec<EdgeQuery>>>) {
    let mut buf = vec![0u8; 2048];

    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                log::debug!("Mock NetAcuity server receive error: {}", e);
                continue;
            }
        };

        let text = String::from_utf8_lossy(&buf[..len]);
        let query = match EdgeQuery::parse(&text) {
            Ok(query) => query,
            Err(e) => {
                log::debug!("Mock NetAcuity server ignoring query from {}: {}", peer, e);
                continue;
            }
        };

        if let Ok(mut received) = received.lock() {
            received.push(query.clone());
        }

        let Some(reply) = responder(&query) else {
            continue;
        };

        let socket = socket.clone();
        tokio::spawn(async move {
            if !reply.delay.is_zero() {
                tokio::time::sleep(reply.delay).await;
            }
            if let Err(e) = socket.send_to(&reply.payload, peer).await {
                log::debug!("Mock NetAcuity server failed to reply to {}: {}", peer, e);
            }
        });
    }
}
