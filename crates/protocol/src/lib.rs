//! Lamport clock protocol types
//!
//! This crate defines the pieces shared by every worker node: the logical
//! clock, the peer message exchanged over TCP, node identities and the
//! static cluster configuration they are resolved from.

pub mod clock;
pub mod config;
pub mod errors;
pub mod message;
pub mod peers;

pub use clock::LogicalClock;
pub use config::{ClusterConfig, NodeSettings, WorkerEntry};
pub use errors::{ConfigError, ProtocolError};
pub use message::{Message, MAX_MESSAGE_SIZE};
pub use peers::{NodeAddress, NodeId, NodeIdentity, PeerTable};
