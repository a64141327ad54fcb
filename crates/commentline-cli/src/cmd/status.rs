//! Status subcommand - summarize the checkpoint directory

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Checkpoint directory (default: <output dir>/checkpoints)
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,
}

pub fn run(args: StatusArgs, config: &Config) -> Result<()> {
    let dir = args
        .checkpoint
        .unwrap_or_else(|| config.output.checkpoint_dir());
    let report = commentline_youtube::status(&dir)?;
    report.print();
    Ok(())
}
