//! keel: host agent that applies declared config files.
//!
//! # Usage
//!
//! ```text
//! keel apply <request.json> [--config <agent.yaml>]
//! keel diff <request.json> [--json]
//! keel hash <path>...
//! keel overview <instance-id> <path>... [--report] [--config <agent.yaml>]
//! keel daemon start [--config <agent.yaml>]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    apply::ApplyArgs, daemon::DaemonCommand, diff::DiffArgs, hash::HashArgs,
    overview::OverviewArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "keel",
    version,
    about = "Apply declared configuration files to this host",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply a config apply request (JSON) to disk, fetching content remotely.
    Apply(ApplyArgs),

    /// Show which files a request would change, without changing them.
    Diff(DiffArgs),

    /// Print content hashes of files.
    Hash(HashArgs),

    /// Describe files on disk as an overview, optionally reporting it.
    Overview(OverviewArgs),

    /// Run the keel daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Apply(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Hash(args) => args.run(),
        Commands::Overview(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
