//! `lamport simulate`
//!
//! Thin launcher: starts the sink, gives it a moment to bind, starts one
//! worker process per configured node, then forwards termination to all of
//! them when interrupted.

use anyhow::{Context, Result};
use clap::Args;
use lamport_protocol::NodeId;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::{load_config, wait_for_shutdown};

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Delay between starting the sink and starting the workers
    #[arg(long, default_value = "2000")]
    pub sink_delay_ms: u64,
    /// Base seed; worker `n` is seeded with `seed + n`
    #[arg(long)]
    pub seed: Option<u64>,
    /// How long to wait for children to exit before killing them
    #[arg(long, default_value = "5000")]
    pub stop_timeout_ms: u64,
}

struct Launched {
    name: String,
    child: Child,
}

/// Execute the simulate command
pub async fn execute_simulate_command(
    config_path: &Path,
    verbose: bool,
    args: SimulateArgs,
) -> Result<()> {
    let config = load_config(config_path)?;
    let exe = std::env::current_exe().context("Failed to locate the lamport executable")?;
    let launcher = Launcher {
        exe,
        config_path: config_path.to_path_buf(),
        verbose,
    };

    let mut children = Vec::new();

    println!("[Launcher] Starting log sink on {}", config.sink);
    children.push(launcher.spawn("sink".to_string(), &["sink".to_string()])?);
    tokio::time::sleep(Duration::from_millis(args.sink_delay_ms)).await;

    for id in config.worker_ids() {
        println!("[Launcher] Starting worker {}", id);
        match launcher.spawn(format!("worker {}", id), &worker_args(id, args.seed)) {
            Ok(child) => children.push(child),
            Err(e) => {
                stop_all(children, Duration::from_millis(args.stop_timeout_ms)).await;
                return Err(e);
            }
        }
    }

    println!("[Launcher] All processes started. Press Ctrl+C to stop.");
    wait_for_shutdown().await;

    println!("[Launcher] Stopping processes...");
    stop_all(children, Duration::from_millis(args.stop_timeout_ms)).await;
    Ok(())
}

struct Launcher {
    exe: PathBuf,
    config_path: PathBuf,
    verbose: bool,
}

impl Launcher {
    fn spawn(&self, name: String, args: &[String]) -> Result<Launched> {
        let mut command = Command::new(&self.exe);
        command.arg("--config").arg(&self.config_path);
        if self.verbose {
            command.arg("--verbose");
        }
        command.args(args).kill_on_drop(true);

        let child = command
            .spawn()
            .with_context(|| format!("Failed to spawn {}", name))?;
        debug!(process = %name, pid = ?child.id(), "spawned");
        Ok(Launched { name, child })
    }
}

fn worker_args(id: NodeId, seed: Option<u64>) -> Vec<String> {
    let mut args = vec!["worker".to_string(), id.to_string()];
    if let Some(seed) = seed {
        args.push("--seed".to_string());
        args.push(seed.wrapping_add(u64::from(id)).to_string());
    }
    args
}

/// Ask every child to terminate, then kill whatever is still running after
/// `timeout`
async fn stop_all(children: Vec<Launched>, timeout: Duration) {
    for launched in children.iter().rev() {
        request_terminate(launched);
    }

    for mut launched in children.into_iter().rev() {
        match tokio::time::timeout(timeout, launched.child.wait()).await {
            Ok(Ok(status)) => debug!(process = %launched.name, %status, "exited"),
            Ok(Err(e)) => warn!("Failed to wait for {}: {}", launched.name, e),
            Err(_) => {
                warn!("{} did not exit in time, killing it", launched.name);
                if let Err(e) = launched.child.kill().await {
                    warn!("Failed to kill {}: {}", launched.name, e);
                }
            }
        }
    }
}

#[cfg(unix)]
fn request_terminate(launched: &Launched) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = launched.child.id() {
        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            debug!(process = %launched.name, error = %e, "SIGTERM not delivered");
        }
    }
}

#[cfg(not(unix))]
fn request_terminate(_launched: &Launched) {
    // Without POSIX signals children are killed once the timeout elapses
}
