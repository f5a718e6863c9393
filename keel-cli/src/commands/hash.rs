//! `keel hash <path>...`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use keel_sync::hasher::read_and_hash;

/// Arguments for `keel hash`.
#[derive(Args, Debug)]
pub struct HashArgs {
    /// Files to hash.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

impl HashArgs {
    pub fn run(self) -> Result<()> {
        for path in &self.paths {
            let (_, hash) =
                read_and_hash(path).with_context(|| format!("failed to hash {}", path.display()))?;
            println!("{hash}  {}", path.display());
        }
        Ok(())
    }
}
