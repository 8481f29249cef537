//! Worker node lifecycle
//!
//! `STARTING -> RUNNING -> STOPPING -> STOPPED`. Construction resolves the
//! node's identity and peers from the cluster configuration (an unknown id
//! is fatal). `start` binds the peer server, runs the activity loop until the
//! shutdown signal fires, logs the shutdown, closes the sink connection and
//! waits for the server to drain.

use lamport_protocol::{ClusterConfig, LogicalClock, NodeId, NodeIdentity, NodeSettings, PeerTable};
use rand::Rng;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::activity::ActivityLoop;
use crate::error::NodeError;
use crate::event_log::{EventLog, LocalSink};
use crate::server::PeerServer;
use crate::shutdown::ShutdownSignal;

/// Lifecycle states of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// One simulated process in the peer messaging protocol
pub struct WorkerNode {
    identity: NodeIdentity,
    peers: PeerTable,
    settings: NodeSettings,
    clock: Arc<LogicalClock>,
    log: Arc<EventLog>,
    shutdown: ShutdownSignal,
    state: watch::Sender<NodeState>,
}

impl WorkerNode {
    /// Build node `node_id` from the cluster configuration
    pub fn new(
        node_id: NodeId,
        config: &ClusterConfig,
        local: Arc<dyn LocalSink>,
    ) -> Result<Self, NodeError> {
        let identity = config.identity(node_id)?;
        let peers = config.peer_table(node_id);
        let settings = config.settings.clone();

        let log = EventLog::new(
            node_id,
            config.sink.clone(),
            settings.connect_timeout(),
            local,
        );
        let (state, _) = watch::channel(NodeState::Starting);

        Ok(Self {
            identity,
            peers,
            settings,
            clock: Arc::new(LogicalClock::new()),
            log: Arc::new(log),
            shutdown: ShutdownSignal::new(),
            state,
        })
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    pub fn clock(&self) -> Arc<LogicalClock> {
        Arc::clone(&self.clock)
    }

    pub fn state(&self) -> NodeState {
        *self.state.borrow()
    }

    /// Observe state transitions after `start` has taken the node
    pub fn subscribe_state(&self) -> watch::Receiver<NodeState> {
        self.state.subscribe()
    }

    /// Handle that stops the node when triggered
    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn stop(&self) {
        self.shutdown.trigger();
    }

    /// Run the node until stopped. Only a failure to bind the node's own
    /// address is returned; everything else is logged and recovered.
    pub async fn start<R: Rng + Send>(self, rng: R) -> Result<(), NodeError> {
        self.log.connect().await;

        let server = match PeerServer::bind(
            &self.identity.address,
            Arc::clone(&self.clock),
            Arc::clone(&self.log),
            &self.settings,
        )
        .await
        {
            Ok(server) => server,
            Err(e) => {
                self.log.close().await;
                self.state.send_replace(NodeState::Stopped);
                return Err(e);
            }
        };
        let server_task = tokio::spawn(server.run(self.shutdown.clone()));

        self.state.send_replace(NodeState::Running);
        info!(node = self.identity.id, addr = %self.identity.address, peers = self.peers.len(), "worker running");
        self.log.record(self.clock.peek(), "STARTED").await;

        let activity = ActivityLoop::new(
            &self.identity,
            self.peers.clone(),
            Arc::clone(&self.clock),
            Arc::clone(&self.log),
            &self.settings,
            rng,
        );
        activity.run(self.shutdown.clone()).await;

        self.state.send_replace(NodeState::Stopping);
        self.log.record(self.clock.peek(), "SHUTTING DOWN").await;
        self.log.close().await;

        if let Err(e) = server_task.await {
            warn!(node = self.identity.id, error = %e, "peer server task failed");
        }

        self.state.send_replace(NodeState::Stopped);
        info!(node = self.identity.id, clock = self.clock.peek(), "worker stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::MemorySink;
    use crate::sink::LogSink;
    use lamport_protocol::{ConfigError, NodeAddress};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn cluster(sink_port: u16, ports: &[(NodeId, u16)]) -> ClusterConfig {
        let workers: Vec<serde_json::Value> = ports
            .iter()
            .map(|(id, port)| serde_json::json!({ "id": id, "host": "127.0.0.1", "port": port }))
            .collect();
        let json = serde_json::json!({
            "sink": { "host": "127.0.0.1", "port": sink_port },
            "workers": workers,
            "settings": {
                "min_interval_ms": 5,
                "max_interval_ms": 20,
                "accept_poll_ms": 50,
                "connect_timeout_ms": 500
            }
        });
        ClusterConfig::from_json(&json.to_string()).unwrap()
    }

    /// Parse `Node a | Clock: c | RECEIVED from Node s (msg clock: m)` into (c, m)
    fn received_clocks(line: &str) -> Option<(u64, u64)> {
        let (_, rest) = line.split_once("| Clock: ")?;
        let (clock, rest) = rest.split_once(" | RECEIVED from Node ")?;
        let (_, rest) = rest.split_once("(msg clock: ")?;
        let msg_clock = rest.strip_suffix(')')?;
        Some((clock.parse().ok()?, msg_clock.parse().ok()?))
    }

    #[test]
    fn test_unknown_node_is_fatal() {
        let config = cluster(5000, &[(1, 5001), (2, 5002)]);
        let result = WorkerNode::new(9, &config, Arc::new(MemorySink::new()));
        assert!(matches!(
            result,
            Err(NodeError::Config(ConfigError::UnknownNode { id: 9 }))
        ));
    }

    #[test]
    fn test_new_node_is_starting() {
        let config = cluster(5000, &[(1, 5001), (2, 5002), (3, 5003)]);
        let node = WorkerNode::new(2, &config, Arc::new(MemorySink::new())).unwrap();

        assert_eq!(node.state(), NodeState::Starting);
        assert_eq!(node.identity().address, NodeAddress::new("127.0.0.1", 5002));
        assert_eq!(node.peers().len(), 2);
        assert_eq!(node.clock().peek(), 0);
    }

    #[tokio::test]
    async fn test_bind_failure_stops_node() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let config = cluster(free_port(), &[(1, port)]);

        let node = WorkerNode::new(1, &config, Arc::new(MemorySink::new())).unwrap();
        let state = node.subscribe_state();

        let result = node.start(StdRng::seed_from_u64(1)).await;
        assert!(matches!(result, Err(NodeError::Bind { .. })));
        assert_eq!(*state.borrow(), NodeState::Stopped);
    }

    #[tokio::test]
    async fn test_two_nodes_exchange_messages() {
        let sink = LogSink::bind(
            &NodeAddress::new("127.0.0.1", 0),
            &NodeSettings::default(),
            Arc::new(MemorySink::new()),
        )
        .await
        .unwrap();
        let sink_port = sink.local_addr().unwrap().port();
        let history = sink.history();
        let sink_shutdown = ShutdownSignal::new();
        let sink_task = tokio::spawn(sink.run(sink_shutdown.clone()));

        let config = cluster(sink_port, &[(1, free_port()), (2, free_port())]);

        let mut tasks = Vec::new();
        let mut handles = Vec::new();
        let mut outputs = Vec::new();
        for (id, seed) in [(1, 10), (2, 20)] {
            let local = Arc::new(MemorySink::new());
            let node = WorkerNode::new(id, &config, local.clone()).unwrap();
            handles.push((node.shutdown_handle(), node.subscribe_state(), node.clock()));
            outputs.push(local);
            tasks.push(tokio::spawn(node.start(StdRng::seed_from_u64(seed))));
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        for (shutdown, state, _) in &handles {
            assert_eq!(*state.borrow(), NodeState::Running);
            shutdown.trigger();
        }
        for task in tasks {
            tokio::time::timeout(Duration::from_secs(2), task)
                .await
                .expect("node should stop")
                .unwrap()
                .unwrap();
        }

        let mut received = 0;
        for ((_, state, clock), local) in handles.iter().zip(&outputs) {
            assert_eq!(*state.borrow(), NodeState::Stopped);
            assert!(clock.peek() > 0);

            let lines = local.lines();
            assert!(lines.iter().any(|l| l.ends_with("| STARTED")));
            assert!(lines.iter().any(|l| l.ends_with("| SHUTTING DOWN")));

            for (clock, msg_clock) in lines.iter().filter_map(|l| received_clocks(l)) {
                assert!(clock >= msg_clock + 1);
                received += 1;
            }
        }
        assert!(received > 0, "seeded runs should exchange at least one message");

        let remote = history.lines();
        assert!(remote.iter().any(|l| l.starts_with("Node 1 |")));
        assert!(remote.iter().any(|l| l.starts_with("Node 2 |")));

        sink_shutdown.trigger();
        sink_task.await.unwrap();
    }
}
