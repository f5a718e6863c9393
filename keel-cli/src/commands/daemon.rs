//! `keel daemon`: run the agent daemon.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;

use keel_daemon::start_blocking;

use super::load_config;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (bus + file plugin + inbox watcher).
    Start {
        /// Agent config file (defaults to ~/.keel/agent.yaml).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;

    match command {
        DaemonCommand::Start { config } => {
            let config = load_config(config.as_deref())?;
            start_blocking(&home, config).context("daemon exited with error")?;
        }
    }
    Ok(())
}
