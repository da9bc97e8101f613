//! `overhuman` -- a personal assistant daemon that learns to replace
//! its own LLM calls with deterministic skills.
//!
//! Subcommands:
//!
//! - `overhuman daemon` -- run the full daemon (adapters, HTTP, heartbeat).
//! - `overhuman once <payload>` -- process one task and exit.
//! - `overhuman status` -- show configuration and store diagnostics.
//! - `overhuman init` -- create the data directory, config, and soul.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod daemon;
mod pidfile;

use overhuman_types::config::{Config, DataDir};

/// overhuman assistant daemon CLI.
#[derive(Parser)]
#[command(name = "overhuman", about = "personal assistant daemon", version)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Data directory override (default ~/.overhuman).
    #[arg(long, global = true)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run the daemon until interrupted.
    Daemon {
        /// Also read tasks from stdin.
        #[arg(long)]
        stdin: bool,
    },

    /// Process a single task and exit.
    Once {
        /// The task text.
        payload: String,
    },

    /// Show configuration status and diagnostics.
    Status,

    /// Initialize the data directory, config file, and soul.
    Init,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("overhuman={default},warn")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let data_dir = match &cli.data_dir {
        Some(dir) => DataDir::at(dir),
        None => DataDir::resolve()?,
    };
    let config = Config::load(&data_dir.config_path())?;

    match cli.command {
        Commands::Daemon { stdin } => daemon::run(config, data_dir, stdin).await,
        Commands::Once { payload } => commands::once(config, data_dir, payload).await,
        Commands::Status => commands::status(config, data_dir).await,
        Commands::Init => commands::init(data_dir).await,
    }
}
