//! Event log
//!
//! Every loggable action becomes one line, `Node <id> | Clock: <c> | <text>`.
//! The line is always written to the local sink first. It is then forwarded
//! to the central log sink if possible: on a failed write (or no open
//! connection) the log makes exactly one reconnect attempt and retries the
//! write once; if that fails too the line is dropped remotely. Nothing is
//! queued.
//!
//! Only one reconnect runs at a time. It happens outside the state lock, and
//! lines recorded while it is in flight skip forwarding, so an unreachable
//! sink costs each caller at most one bounded attempt.

use lamport_protocol::{NodeAddress, NodeId};
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::client::connect;

/// Destination for locally emitted lines
pub trait LocalSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Writes lines to standard output
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl LocalSink for StdoutSink {
    fn write_line(&self, line: &str) {
        println!("{}", line);
    }
}

/// Keeps lines in memory; used by tests and embedders that inspect output
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: StdMutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LocalSink for MemorySink {
    fn write_line(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}

/// A single timestamped event, formatted and discarded on emission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub node_id: NodeId,
    pub clock: u64,
    pub text: String,
}

impl LogEvent {
    pub fn new(node_id: NodeId, clock: u64, text: impl Into<String>) -> Self {
        Self {
            node_id,
            clock,
            text: text.into(),
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node {} | Clock: {} | {}", self.node_id, self.clock, self.text)
    }
}

#[derive(Debug, Default)]
struct RemoteState {
    stream: Option<TcpStream>,
    closed: bool,
    /// A reconnect is in flight; other callers skip forwarding meanwhile
    reconnecting: bool,
}

/// Per-node event log with best-effort forwarding to the central sink
pub struct EventLog {
    node_id: NodeId,
    sink_addr: Option<NodeAddress>,
    /// Bounds connects, writes and the wait for the state lock
    io_timeout: Duration,
    local: Arc<dyn LocalSink>,
    // Held only for bounded writes; never across a connect.
    remote: Mutex<RemoteState>,
}

impl EventLog {
    /// Create a log that forwards to `sink_addr`. No connection is opened
    /// until [`EventLog::connect`] or the first forwarded line.
    pub fn new(
        node_id: NodeId,
        sink_addr: NodeAddress,
        io_timeout: Duration,
        local: Arc<dyn LocalSink>,
    ) -> Self {
        Self {
            node_id,
            sink_addr: Some(sink_addr),
            io_timeout,
            local,
            remote: Mutex::new(RemoteState::default()),
        }
    }

    /// Create a log that only writes locally
    pub fn local_only(node_id: NodeId, local: Arc<dyn LocalSink>) -> Self {
        Self {
            node_id,
            sink_addr: None,
            io_timeout: Duration::from_secs(1),
            local,
            remote: Mutex::new(RemoteState::default()),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Open the sink connection. A failure is reported as one local error
    /// line and the log carries on locally.
    pub async fn connect(&self) -> bool {
        let Some(addr) = &self.sink_addr else {
            return false;
        };

        {
            let mut remote = self.remote.lock().await;
            if remote.closed || remote.reconnecting {
                return false;
            }
            if remote.stream.is_some() {
                return true;
            }
            remote.reconnecting = true;
        }

        match connect(addr, self.io_timeout).await {
            Ok(stream) => {
                debug!(node = self.node_id, sink = %addr, "connected to log sink");
                self.settle(Some(stream)).await
            }
            Err(e) => {
                self.error(format!("Failed to connect to log sink {}: {}", addr, e));
                self.settle(None).await
            }
        }
    }

    /// Emit an event stamped with `clock`
    pub async fn record(&self, clock: u64, text: impl Into<String>) {
        self.emit(&LogEvent::new(self.node_id, clock, text)).await;
    }

    /// Emit a prepared event: local line first, then the forward attempt
    pub async fn emit(&self, event: &LogEvent) {
        let line = event.to_string();
        self.local.write_line(&line);
        self.forward(&line).await;
    }

    /// Write a local-only error line
    pub fn error(&self, text: impl AsRef<str>) {
        self.local
            .write_line(&format!("Node {} | ERROR | {}", self.node_id, text.as_ref()));
    }

    /// Close the sink connection; later events are written locally only
    pub async fn close(&self) {
        let mut remote = self.remote.lock().await;
        remote.closed = true;
        if let Some(mut stream) = remote.stream.take() {
            let _ = stream.shutdown().await;
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.remote.lock().await.stream.is_some()
    }

    async fn forward(&self, line: &str) {
        let Some(addr) = &self.sink_addr else {
            return;
        };

        let Ok(mut remote) = tokio::time::timeout(self.io_timeout, self.remote.lock()).await else {
            debug!(node = self.node_id, "sink busy, line dropped");
            return;
        };
        if remote.closed {
            return;
        }
        if remote.reconnecting {
            debug!(node = self.node_id, "sink reconnect in flight, line dropped");
            return;
        }

        let payload = format!("{}\n", line);

        if let Some(stream) = remote.stream.as_mut() {
            match write_line(stream, &payload, self.io_timeout).await {
                Ok(()) => return,
                Err(e) => debug!(node = self.node_id, error = %e, "sink write failed, reconnecting"),
            }
        }
        remote.stream = None;
        remote.reconnecting = true;
        drop(remote);

        let stream = match connect(addr, self.io_timeout).await {
            Ok(mut stream) => match write_line(&mut stream, &payload, self.io_timeout).await {
                Ok(()) => Some(stream),
                Err(e) => {
                    debug!(node = self.node_id, error = %e, "sink retry failed, line dropped");
                    None
                }
            },
            Err(e) => {
                debug!(node = self.node_id, error = %e, "sink unreachable, line dropped");
                None
            }
        };
        self.settle(stream).await;
    }

    /// Finish a reconnect; returns whether a connection is now held
    async fn settle(&self, stream: Option<TcpStream>) -> bool {
        let mut remote = self.remote.lock().await;
        remote.reconnecting = false;
        match stream {
            Some(stream) if !remote.closed => {
                remote.stream = Some(stream);
                true
            }
            _ => false,
        }
    }
}

async fn write_line(stream: &mut TcpStream, payload: &str, timeout: Duration) -> io::Result<()> {
    match tokio::time::timeout(timeout, stream.write_all(payload.as_bytes())).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "sink write timed out")),
    }
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("node_id", &self.node_id)
            .field("sink_addr", &self.sink_addr)
            .finish()
    }
}
