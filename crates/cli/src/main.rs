use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
use commands::{
    execute_simulate_command, execute_sink_command, execute_validate_command,
    execute_worker_command, SimulateArgs, SinkArgs, WorkerArgs,
};

#[derive(Parser)]
#[command(name = "lamport")]
#[command(about = "Lamport logical clock simulation - peer workers and a central log sink")]
#[command(version = "0.1.0")]
pub struct Cli {
    /// Cluster configuration file
    #[arg(short, long, global = true, default_value = "config.json")]
    pub config: PathBuf,
    /// Enable debug diagnostics on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one worker node
    Worker(WorkerArgs),
    /// Run the central log sink
    Sink(SinkArgs),
    /// Launch the sink and every configured worker as child processes
    Simulate(SimulateArgs),
    /// Validate a configuration file and print the node table
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Worker(args) => execute_worker_command(&cli.config, args).await,
        Commands::Sink(args) => execute_sink_command(&cli.config, args).await,
        Commands::Simulate(args) => execute_simulate_command(&cli.config, cli.verbose, args).await,
        Commands::Validate => execute_validate_command(&cli.config),
    }
}

/// Diagnostics go to stderr so stdout carries only event lines
fn setup_logging(verbose: bool) {
    let default_filter = if verbose { "lamport=debug,info" } else { "lamport=info,warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
