//! Cluster configuration
//!
//! A static JSON mapping from node id to listen address plus the sink's
//! address. Each worker resolves its own identity and peer table from it once
//! at startup and never re-reads it.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::peers::{NodeAddress, NodeId, NodeIdentity, PeerTable};

/// One worker entry in the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerEntry {
    pub id: NodeId,
    pub host: String,
    pub port: u16,
}

impl WorkerEntry {
    pub fn identity(&self) -> NodeIdentity {
        NodeIdentity::new(self.id, NodeAddress::new(self.host.clone(), self.port))
    }
}

/// Tunables shared by every node in the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Lower bound of the randomized activity interval (milliseconds)
    pub min_interval_ms: u64,
    /// Upper bound of the randomized activity interval (milliseconds)
    pub max_interval_ms: u64,
    /// Longest a single accept wait may block before re-checking shutdown
    pub accept_poll_ms: u64,
    /// Timeout for outbound connects to peers and to the sink
    pub connect_timeout_ms: u64,
    /// Cap on concurrently handled inbound connections
    pub max_concurrent_handlers: usize,
    /// Number of recent lines the log sink keeps in memory
    pub sink_history: usize,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            min_interval_ms: 1000,
            max_interval_ms: 3000,
            accept_poll_ms: 1000,
            connect_timeout_ms: 2000,
            max_concurrent_handlers: 64,
            sink_history: 1000,
        }
    }
}

impl NodeSettings {
    pub fn accept_poll(&self) -> Duration {
        Duration::from_millis(self.accept_poll_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Check the settings are usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_interval_ms > self.max_interval_ms {
            return Err(ConfigError::InvalidSetting {
                reason: format!(
                    "min_interval_ms ({}) exceeds max_interval_ms ({})",
                    self.min_interval_ms, self.max_interval_ms
                ),
            });
        }
        if self.accept_poll_ms == 0 {
            return Err(ConfigError::InvalidSetting {
                reason: "accept_poll_ms must be greater than zero".to_string(),
            });
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidSetting {
                reason: "connect_timeout_ms must be greater than zero".to_string(),
            });
        }
        if self.max_concurrent_handlers == 0 {
            return Err(ConfigError::InvalidSetting {
                reason: "max_concurrent_handlers must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// The whole cluster: sink address, workers and shared settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(alias = "monitor")]
    pub sink: NodeAddress,
    pub workers: Vec<WorkerEntry>,
    #[serde(default)]
    pub settings: NodeSettings,
}

impl ClusterConfig {
    /// Load and validate a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json(&contents)
    }

    /// Parse and validate a configuration document
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let config: ClusterConfig = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers.is_empty() {
            return Err(ConfigError::NoWorkers);
        }

        let mut seen = HashSet::new();
        for worker in &self.workers {
            if !seen.insert(worker.id) {
                return Err(ConfigError::DuplicateNode { id: worker.id });
            }
        }

        self.settings.validate()
    }

    /// Resolve the identity of `id`; fails when the node is not configured
    pub fn identity(&self, id: NodeId) -> Result<NodeIdentity, ConfigError> {
        self.workers
            .iter()
            .find(|w| w.id == id)
            .map(WorkerEntry::identity)
            .ok_or(ConfigError::UnknownNode { id })
    }

    /// Every configured worker except `id`
    pub fn peer_table(&self, id: NodeId) -> PeerTable {
        PeerTable::new(id, self.workers.iter().map(WorkerEntry::identity))
    }

    pub fn worker_ids(&self) -> Vec<NodeId> {
        self.workers.iter().map(|w| w.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"{
        "monitor": { "host": "127.0.0.1", "port": 5000 },
        "workers": [
            { "id": 1, "host": "127.0.0.1", "port": 5001 },
            { "id": 2, "host": "127.0.0.1", "port": 5002 },
            { "id": 3, "host": "127.0.0.1", "port": 5003 }
        ]
    }"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = ClusterConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.sink, NodeAddress::new("127.0.0.1", 5000));
        assert_eq!(config.workers.len(), 3);
        assert_eq!(config.settings, NodeSettings::default());
    }

    #[test]
    fn test_partial_settings() {
        let json = r#"{
            "sink": { "host": "localhost", "port": 6000 },
            "workers": [{ "id": 7, "host": "localhost", "port": 6007 }],
            "settings": { "min_interval_ms": 10, "max_interval_ms": 20 }
        }"#;
        let config = ClusterConfig::from_json(json).unwrap();
        assert_eq!(config.settings.min_interval_ms, 10);
        assert_eq!(config.settings.max_interval_ms, 20);
        assert_eq!(config.settings.accept_poll_ms, 1000);
    }

    #[test]
    fn test_identity_and_peers() {
        let config = ClusterConfig::from_json(SAMPLE).unwrap();

        let me = config.identity(2).unwrap();
        assert_eq!(me.address.port, 5002);

        let peers = config.peer_table(2);
        assert_eq!(peers.len(), 2);
        assert!(peers.get(2).is_none());
    }

    #[test]
    fn test_unknown_node() {
        let config = ClusterConfig::from_json(SAMPLE).unwrap();
        assert!(matches!(
            config.identity(9),
            Err(ConfigError::UnknownNode { id: 9 })
        ));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let json = r#"{
            "sink": { "host": "127.0.0.1", "port": 5000 },
            "workers": [
                { "id": 1, "host": "127.0.0.1", "port": 5001 },
                { "id": 1, "host": "127.0.0.1", "port": 5002 }
            ]
        }"#;
        assert!(matches!(
            ClusterConfig::from_json(json),
            Err(ConfigError::DuplicateNode { id: 1 })
        ));
    }

    #[test]
    fn test_no_workers_rejected() {
        let json = r#"{ "sink": { "host": "127.0.0.1", "port": 5000 }, "workers": [] }"#;
        assert!(matches!(ClusterConfig::from_json(json), Err(ConfigError::NoWorkers)));
    }

    #[test]
    fn test_inverted_interval_rejected() {
        let mut config = ClusterConfig::from_json(SAMPLE).unwrap();
        config.settings.min_interval_ms = 5000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = ClusterConfig::load(file.path()).unwrap();
        assert_eq!(config.worker_ids(), vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ClusterConfig::load(dir.path().join("absent.json"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_malformed_file() {
        assert!(matches!(
            ClusterConfig::from_json("{ not json"),
            Err(ConfigError::Parse { .. })
        ));
    }
}
