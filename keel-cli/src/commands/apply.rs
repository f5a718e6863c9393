//! `keel apply <request.json>`: one-shot config apply.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use keel_core::{AgentConfig, FileOverview};
use keel_sync::{AtomicFileOperator, CallContext, FileManagerService};

use super::{load_config, read_request, runtime};

/// Arguments for `keel apply`.
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Config apply request (JSON).
    pub request: PathBuf,

    /// Agent config file (defaults to ~/.keel/agent.yaml).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl ApplyArgs {
    pub fn run(self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        let request = read_request(&self.request)?;
        let overview = request
            .overview
            .context("request carries no overview")?;

        runtime()?.block_on(apply(config, request.correlation_id, overview))
    }
}

async fn apply(config: AgentConfig, correlation_id: String, overview: FileOverview) -> Result<()> {
    let timeout = config.config_apply.timeout;
    let rollback_on_failure = config.config_apply.rollback_on_failure;

    // The gRPC channel is lazy but still needs a runtime to spawn into.
    let transfer = keel_daemon::transfer_client(&config)?;
    let mut manager =
        FileManagerService::new(transfer, Arc::new(AtomicFileOperator::new()), config);
    let ctx = CallContext::new()
        .with_correlation_id(correlation_id)
        .with_timeout(timeout);

    if let Err(err) = manager.config_apply(&ctx, &overview).await {
        if rollback_on_failure && !err.is_validation() {
            match manager.rollback() {
                Ok(()) => eprintln!("{} rolled back partial apply", "↺".yellow()),
                Err(rollback_err) => {
                    eprintln!("{} rollback incomplete: {rollback_err}", "✗".red())
                }
            }
        }
        bail!("config apply failed ({}): {err}", ctx.correlation_id);
    }

    let mut changed: Vec<_> = manager.files_cache().values().collect();
    if changed.is_empty() {
        println!("{} nothing to do", "✓".green());
        return Ok(());
    }
    changed.sort_by(|a, b| a.path().cmp(b.path()));
    println!("{} applied {} file(s)", "✓".green(), changed.len());
    for file in changed {
        println!("  {:<7} {}", file.action.to_string(), file.path());
    }
    Ok(())
}
