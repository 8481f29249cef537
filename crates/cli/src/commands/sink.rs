//! `lamport sink`

use anyhow::{Context, Result};
use clap::Args;
use lamport_node::{LogSink, ShutdownSignal, StdoutSink};
use std::path::Path;
use std::sync::Arc;

use super::{load_config, wait_for_shutdown};

#[derive(Args, Debug, Default)]
pub struct SinkArgs {
    /// Listen port, overriding the configured sink port
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Execute the sink command
pub async fn execute_sink_command(config_path: &Path, args: SinkArgs) -> Result<()> {
    let config = load_config(config_path)?;
    let mut address = config.sink.clone();
    if let Some(port) = args.port {
        address.port = port;
    }

    let sink = LogSink::bind(&address, &config.settings, Arc::new(StdoutSink))
        .await
        .with_context(|| format!("Failed to start log sink on {}", address))?;

    println!("[Sink] Listening on {}. Waiting for logs...", address);

    let shutdown = ShutdownSignal::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        trigger.trigger();
    });

    sink.run(shutdown).await;
    println!("[Sink] Shutting down");
    Ok(())
}
