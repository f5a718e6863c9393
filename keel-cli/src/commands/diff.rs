//! `keel diff <request.json>`: what an apply would change.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use keel_core::{File, FileAction};
use keel_sync::compare_file_hash;

use super::read_request;

/// Arguments for `keel diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Config apply request (JSON).
    pub request: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct DiffRow {
    #[tabled(rename = "action")]
    action: String,
    #[tabled(rename = "path")]
    path: String,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let request = read_request(&self.request)?;
        let overview = request
            .overview
            .context("request carries no overview")?;

        let diff = compare_file_hash(&overview)
            .with_context(|| format!("diff failed for {}", self.request.display()))?;

        let mut changed: Vec<File> = diff.changed.into_values().collect();
        changed.sort_by(|a, b| a.path().cmp(b.path()));

        if self.json {
            let payload: Vec<_> = changed
                .iter()
                .map(|f| serde_json::json!({ "path": f.path(), "action": f.action }))
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to render diff JSON")?
            );
            return Ok(());
        }

        if changed.is_empty() {
            println!("No differences.");
            return Ok(());
        }

        let rows: Vec<DiffRow> = changed
            .iter()
            .map(|f| DiffRow {
                action: action_label(f.action),
                path: f.path().to_string(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

fn action_label(action: FileAction) -> String {
    match action {
        FileAction::Add => "add".green().to_string(),
        FileAction::Update => "update".yellow().to_string(),
        FileAction::Delete => "delete".red().to_string(),
        other => other.to_string(),
    }
}
