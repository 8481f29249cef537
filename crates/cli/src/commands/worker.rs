//! `lamport worker <id>`

use anyhow::{Context, Result};
use clap::Args;
use lamport_node::{StdoutSink, WorkerNode};
use lamport_protocol::{NodeId, NodeSettings};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::{load_config, wait_for_shutdown};

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Id of this worker in the configuration
    pub id: NodeId,
    /// Seed for peer selection and activity intervals (random when omitted)
    #[arg(long)]
    pub seed: Option<u64>,
    /// Override the lower bound of the activity interval
    #[arg(long)]
    pub min_interval_ms: Option<u64>,
    /// Override the upper bound of the activity interval
    #[arg(long)]
    pub max_interval_ms: Option<u64>,
}

/// Execute the worker command
pub async fn execute_worker_command(config_path: &Path, args: WorkerArgs) -> Result<()> {
    let mut config = load_config(config_path)?;
    apply_overrides(&mut config.settings, &args);
    config.validate().context("Invalid worker settings")?;

    let node = WorkerNode::new(args.id, &config, Arc::new(StdoutSink))
        .with_context(|| format!("Failed to create worker {}", args.id))?;

    let shutdown = node.shutdown_handle();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!("Shutdown signal received");
        shutdown.trigger();
    });

    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    node.start(rng)
        .await
        .with_context(|| format!("Worker {} failed to start", args.id))
}

fn apply_overrides(settings: &mut NodeSettings, args: &WorkerArgs) {
    if let Some(min) = args.min_interval_ms {
        settings.min_interval_ms = min;
    }
    if let Some(max) = args.max_interval_ms {
        settings.max_interval_ms = max;
    }
}
