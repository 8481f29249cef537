//! `lamport validate`

use anyhow::Result;
use lamport_protocol::ClusterConfig;
use std::path::Path;

use super::load_config;

/// Load the configuration and print the node table
pub fn execute_validate_command(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    print!("{}", describe(&config));
    Ok(())
}

fn describe(config: &ClusterConfig) -> String {
    let mut out = format!("Sink: {}\nWorkers:\n", config.sink);
    for worker in &config.workers {
        out.push_str(&format!("  Node {} -> {}:{}\n", worker.id, worker.host, worker.port));
    }
    out.push_str(&format!(
        "Activity interval: {}-{} ms\n",
        config.settings.min_interval_ms, config.settings.max_interval_ms
    ));
    out
}
