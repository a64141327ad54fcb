//! Export subcommand - convert harvested JSONL to Parquet

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use commentline_core::fmt_num;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Harvested JSONL file (default: <output dir>/comments.jsonl)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Parquet file to write
    #[arg(short, long)]
    pub output: PathBuf,

    /// Zstd compression level (1-22)
    #[arg(short, long)]
    pub zstd_level: Option<i32>,
}

pub fn run(args: ExportArgs, config: &Config) -> Result<()> {
    let input = args.input.unwrap_or_else(|| config.output.comments_file());
    let zstd_level = args.zstd_level.unwrap_or(config.output.compression_level);
    let started = Instant::now();

    log::info!("Exporting {} -> {}", input.display(), args.output.display());
    let stats = commentline_core::export_jsonl_to_parquet(&input, &args.output, zstd_level)
        .with_context(|| format!("Export of {} failed", input.display()))?;

    log::info!(
        "Exported {} rows ({} lines scanned, {} unparseable) [{:.1}s]",
        fmt_num(stats.rows_written as u64),
        fmt_num(stats.lines_scanned as u64),
        stats.bad_lines,
        started.elapsed().as_secs_f64()
    );
    if stats.bad_lines > 0 {
        log::warn!("{} lines could not be parsed and were skipped", stats.bad_lines);
    }
    Ok(())
}
