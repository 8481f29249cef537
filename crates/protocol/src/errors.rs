//! Protocol and configuration errors

use thiserror::Error;

use crate::peers::NodeId;

/// Wire-level errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serialization error: {source}")]
    SerializationError { source: serde_json::Error },

    #[error("Empty payload")]
    EmptyPayload,

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Invalid format: {reason}")]
    InvalidFormat { reason: String },
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::SerializationError { source: err }
    }
}

/// Errors raised while loading or resolving the cluster configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {source}")]
    Parse { source: serde_json::Error },

    #[error("Node {id} not found in configuration")]
    UnknownNode { id: NodeId },

    #[error("Duplicate node id {id} in configuration")]
    DuplicateNode { id: NodeId },

    #[error("Configuration lists no workers")]
    NoWorkers,

    #[error("Invalid setting: {reason}")]
    InvalidSetting { reason: String },
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse { source: err }
    }
}
