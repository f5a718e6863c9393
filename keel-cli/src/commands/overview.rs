//! `keel overview <instance-id> <path>...`: describe files on disk.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use keel_core::InstanceId;
use keel_sync::{overview_from_paths, CallContext};

use super::{load_config, runtime};

/// Arguments for `keel overview`.
#[derive(Args, Debug)]
pub struct OverviewArgs {
    /// Instance the files belong to.
    pub instance_id: String,

    /// Files to include.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Also send the overview to the configured command server.
    #[arg(long)]
    pub report: bool,

    /// Agent config file (defaults to ~/.keel/agent.yaml).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl OverviewArgs {
    pub fn run(self) -> Result<()> {
        let overview = overview_from_paths(InstanceId::from(self.instance_id), &self.paths)
            .context("failed to describe files")?;
        println!(
            "{}",
            serde_json::to_string_pretty(&overview).context("failed to render overview JSON")?
        );

        if !self.report {
            return Ok(());
        }

        let config = load_config(self.config.as_deref())?;
        runtime()?.block_on(async {
            let transfer = keel_daemon::transfer_client(&config)?;
            transfer
                .report_overview(&CallContext::new(), &overview)
                .await
                .context("failed to report overview")
        })?;
        eprintln!("reported {} file(s)", overview.files.len());
        Ok(())
    }
}
