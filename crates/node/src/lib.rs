//! Lamport worker node
//!
//! A worker runs a peer server that merges inbound message clocks and an
//! activity loop that produces internal events and sends, both reporting
//! through an event log that forwards lines to a central sink on a
//! best-effort basis. The sink itself lives here too.

pub mod activity;
pub mod client;
pub mod error;
pub mod event_log;
pub mod server;
pub mod shutdown;
pub mod sink;
pub mod worker;

// Re-export key types
pub use activity::{Action, ActivityLoop, StepOutcome};
pub use client::PeerClient;
pub use error::NodeError;
pub use event_log::{EventLog, LocalSink, LogEvent, MemorySink, StdoutSink};
pub use server::PeerServer;
pub use shutdown::ShutdownSignal;
pub use sink::{LogSink, SinkHistory};
pub use worker::{NodeState, WorkerNode};
