//! commentline - resumable YouTube comment harvester
//!
//! Collects comments for explicit videos and search-discovered videos into
//! JSONL, checkpointing after every page, and exports the result to Parquet.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "commentline")]
#[command(about = "Resumable YouTube comment harvester")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./commentline.toml or ~/.config/commentline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Harvest comments (resumes from checkpoints)
    Harvest(cmd::harvest::HarvestCmd),
    /// Show checkpoint progress
    Status(cmd::status::StatusArgs),
    /// Convert harvested JSONL to Parquet
    Export(cmd::export::ExportArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(commentline_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug, progress bars show activity
    //   non-TTY: info unless --debug, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    commentline_core::init_logging(quiet, cli.debug, multi);

    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    commentline_core::set_http_config(commentline_core::HttpConfig {
        timeout: std::time::Duration::from_secs(cli.timeout.unwrap_or(config.http.timeout)),
        ..Default::default()
    });

    match cli.command {
        Command::Harvest(args) => {
            if let Err(e) = commentline_core::install_signal_handlers() {
                log::warn!("Signal handlers not installed: {e}");
            }
            cmd::harvest::run(args, &config, &progress)
        }
        Command::Status(args) => cmd::status::run(args, &config).map(|()| ExitCode::SUCCESS),
        Command::Export(args) => cmd::export::run(args, &config).map(|()| ExitCode::SUCCESS),
        Command::Config => {
            print_config(&config);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_config(config: &Config) {
    use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    table.add_row(vec![
        "Output file",
        &config.output.comments_file().display().to_string(),
    ]);
    table.add_row(vec![
        "Checkpoints",
        &config.output.checkpoint_dir().display().to_string(),
    ]);
    table.add_row(vec![
        "Compression level",
        &config.output.compression_level.to_string(),
    ]);
    table.add_row(vec!["API URL", &config.youtube.api_url]);
    let key_source = if config.youtube.api_key.is_some() {
        "configured"
    } else if std::env::var(commentline_youtube::API_KEY_ENV).is_ok() {
        "from environment"
    } else {
        "not set"
    };
    table.add_row(vec!["API key", key_source]);
    let max = config.harvest.max_items_per_unit;
    table.add_row(vec![
        "Max comments/video",
        &if max == 0 {
            "unlimited".to_string()
        } else {
            max.to_string()
        },
    ]);
    table.add_row(vec![
        "Videos/query",
        &config.harvest.units_per_query.to_string(),
    ]);
    table.add_row(vec!["Replies", &config.harvest.replies]);
    table.add_row(vec!["Search order", &config.harvest.order]);
    table.add_row(vec![
        "Backoff",
        &format!(
            "{}ms..{}ms, {} rate-limit / {} transient retries",
            config.backoff.base_ms,
            config.backoff.cap_ms,
            config.backoff.rate_limit_attempts,
            config.backoff.transient_attempts
        ),
    ]);
    table.add_row(vec![
        "Quota budget",
        &config
            .quota
            .budget
            .map_or_else(|| "unlimited".to_string(), |b| b.to_string()),
    ]);
    table.add_row(vec!["Timeout", &format!("{}s", config.http.timeout)]);

    eprintln!("\n{table}");
}
