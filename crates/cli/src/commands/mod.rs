//! CLI command modules

pub mod simulate;
pub mod sink;
pub mod validate;
pub mod worker;

pub use simulate::{execute_simulate_command, SimulateArgs};
pub use sink::{execute_sink_command, SinkArgs};
pub use validate::execute_validate_command;
pub use worker::{execute_worker_command, WorkerArgs};

use anyhow::{Context, Result};
use lamport_protocol::ClusterConfig;
use std::path::Path;
use tokio::signal;
use tracing::warn;

/// Load the cluster configuration with a readable error
pub fn load_config(path: &Path) -> Result<ClusterConfig> {
    ClusterConfig::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
