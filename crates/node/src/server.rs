//! Peer server
//!
//! Accepts one message per inbound connection and merges its clock into the
//! node's clock. The accept loop waits at most `accept_poll` per iteration so
//! it notices shutdown promptly; each connection is handled on its own task,
//! with a semaphore capping how many are processed at once.

use lamport_protocol::{LogicalClock, Message, NodeAddress, NodeSettings, MAX_MESSAGE_SIZE};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::error::NodeError;
use crate::event_log::EventLog;
use crate::shutdown::ShutdownSignal;

/// Listener side of a worker node
pub struct PeerServer {
    listener: TcpListener,
    clock: Arc<LogicalClock>,
    log: Arc<EventLog>,
    accept_poll: Duration,
    permits: Arc<Semaphore>,
}

impl PeerServer {
    /// Bind the node's own address
    pub async fn bind(
        address: &NodeAddress,
        clock: Arc<LogicalClock>,
        log: Arc<EventLog>,
        settings: &NodeSettings,
    ) -> Result<Self, NodeError> {
        let listener = TcpListener::bind((address.host.as_str(), address.port))
            .await
            .map_err(|e| NodeError::Bind {
                addr: address.to_string(),
                source: e,
            })?;

        Ok(Self {
            listener,
            clock,
            log,
            accept_poll: settings.accept_poll(),
            permits: Arc::new(Semaphore::new(settings.max_concurrent_handlers)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NodeError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` is triggered, then wait for
    /// in-flight handlers to finish.
    ///
    /// Handlers are not aborted and reads have no deadline: a peer that
    /// connects and neither writes nor closes keeps its handler, and
    /// therefore this method, pending until the peer goes away.
    pub async fn run(self, shutdown: ShutdownSignal) {
        let mut handlers = JoinSet::new();
        info!(node = self.log.node_id(), addr = ?self.listener.local_addr().ok(), "peer server listening");

        while !shutdown.is_triggered() {
            while handlers.try_join_next().is_some() {}

            let accepted = match tokio::time::timeout(self.accept_poll, self.listener.accept()).await {
                Ok(accepted) => accepted,
                Err(_) => continue,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let clock = Arc::clone(&self.clock);
                    let log = Arc::clone(&self.log);
                    let permits = Arc::clone(&self.permits);
                    handlers.spawn(async move {
                        let _permit = permits.acquire_owned().await;
                        handle_connection(stream, peer, &clock, &log).await;
                    });
                }
                Err(e) => self.log.error(format!("Accept error: {}", e)),
            }
        }

        debug!(node = self.log.node_id(), in_flight = handlers.len(), "peer server stopping");
        while handlers.join_next().await.is_some() {}
    }
}

/// Read exactly one message from `stream` and absorb it. Malformed input
/// produces one local error line and leaves the clock untouched.
pub(crate) async fn handle_connection<S>(
    stream: S,
    peer: SocketAddr,
    clock: &LogicalClock,
    log: &EventLog,
) where
    S: AsyncRead + Unpin,
{
    let mut payload = Vec::new();
    if let Err(e) = stream
        .take(MAX_MESSAGE_SIZE as u64 + 1)
        .read_to_end(&mut payload)
        .await
    {
        log.error(format!("Error reading message from {}: {}", peer, e));
        return;
    }

    let message = match Message::decode(&payload) {
        Ok(message) => message,
        Err(e) => {
            log.error(format!("Error processing message from {}: {}", peer, e));
            return;
        }
    };

    let value = clock.update(message.clock);
    log.record(
        value,
        format!(
            "RECEIVED from Node {} (msg clock: {})",
            message.sender_id, message.clock
        ),
    )
    .await;
}
