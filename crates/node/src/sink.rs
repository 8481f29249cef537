//! Central log sink
//!
//! A line-oriented TCP text sink. Workers hold one long-lived connection
//! each and write newline-terminated lines; the sink prints every line and
//! keeps the most recent ones in memory. It never replies, and an abrupt
//! disconnect only ends that connection.

use lamport_protocol::{NodeAddress, NodeSettings};
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::error::NodeError;
use crate::event_log::LocalSink;
use crate::shutdown::ShutdownSignal;

/// Longest line the sink accepts, excluding the terminator
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Bounded buffer of the most recently received lines
#[derive(Debug)]
pub struct SinkHistory {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl SinkHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn push(&self, line: String) {
        if self.capacity == 0 {
            return;
        }
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Snapshot, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

pub struct LogSink {
    listener: TcpListener,
    history: Arc<SinkHistory>,
    output: Arc<dyn LocalSink>,
    accept_poll: Duration,
}

impl LogSink {
    pub async fn bind(
        address: &NodeAddress,
        settings: &NodeSettings,
        output: Arc<dyn LocalSink>,
    ) -> Result<Self, NodeError> {
        let listener = TcpListener::bind((address.host.as_str(), address.port))
            .await
            .map_err(|e| NodeError::Bind {
                addr: address.to_string(),
                source: e,
            })?;

        Ok(Self {
            listener,
            history: Arc::new(SinkHistory::new(settings.sink_history)),
            output,
            accept_poll: settings.accept_poll(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NodeError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn history(&self) -> Arc<SinkHistory> {
        Arc::clone(&self.history)
    }

    /// Serve until `shutdown`; open connections are dropped on exit
    pub async fn run(self, shutdown: ShutdownSignal) {
        let mut connections = JoinSet::new();
        info!(addr = ?self.listener.local_addr().ok(), "log sink listening");

        while !shutdown.is_triggered() {
            while connections.try_join_next().is_some() {}

            let accepted = match tokio::time::timeout(self.accept_poll, self.listener.accept()).await {
                Ok(accepted) => accepted,
                Err(_) => continue,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let history = Arc::clone(&self.history);
                    let output = Arc::clone(&self.output);
                    connections.spawn(async move {
                        read_lines(stream, peer, &history, output.as_ref()).await;
                    });
                }
                Err(e) => self.output.write_line(&format!("[Sink] Accept error: {}", e)),
            }
        }

        debug!(open = connections.len(), "log sink stopping");
        connections.shutdown().await;
    }
}

async fn read_lines<S>(stream: S, peer: SocketAddr, history: &SinkHistory, output: &dyn LocalSink)
where
    S: AsyncRead + Unpin,
{
    output.write_line(&format!("[Sink] Connection opened: {}", peer));

    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_LINE_LEN as u64 + 1)
            .read_until(b'\n', &mut buf)
            .await;

        match read {
            Ok(0) => break,
            Ok(_) => {
                if buf.len() > MAX_LINE_LEN && buf.last() != Some(&b'\n') {
                    output.write_line(&format!(
                        "[Sink] Error on connection {}: line exceeds {} bytes",
                        peer, MAX_LINE_LEN
                    ));
                    break;
                }
                let line = match std::str::from_utf8(&buf) {
                    Ok(line) => line.trim(),
                    Err(e) => {
                        output.write_line(&format!("[Sink] Error on connection {}: {}", peer, e));
                        break;
                    }
                };
                if !line.is_empty() {
                    output.write_line(&format!("[Central Log] {}", line));
                    history.push(line.to_string());
                }
            }
            Err(e) if e.kind() == ErrorKind::ConnectionReset => break,
            Err(e) => {
                output.write_line(&format!("[Sink] Error on connection {}: {}", peer, e));
                break;
            }
        }
    }

    output.write_line(&format!("[Sink] Connection closed: {}", peer));
}
