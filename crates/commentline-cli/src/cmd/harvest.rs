//! Harvest subcommand - collect comments for videos and search queries

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, ValueEnum};

use commentline_core::SharedProgress;
use commentline_youtube::HarvestArgs;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct HarvestCmd {
    /// Video ids or URLs (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub video_ids: Vec<String>,

    /// File with one search query per line
    #[arg(long)]
    pub queries: Option<PathBuf>,

    /// Search query (repeatable)
    #[arg(short, long = "query")]
    pub query: Vec<String>,

    /// Stop each video after this many comments (0 = unlimited)
    #[arg(short, long)]
    pub max_comments_per_video: Option<u64>,

    /// Videos taken from each query's search results
    #[arg(long)]
    pub videos_per_query: Option<usize>,

    /// Search result ordering
    #[arg(long, value_enum)]
    pub order: Option<Order>,

    /// ISO 3166-1 region code for search
    #[arg(long)]
    pub region: Option<String>,

    /// Only videos published after this date (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub published_after: Option<String>,

    /// Reply collection mode
    #[arg(long, value_enum)]
    pub replies: Option<Replies>,

    /// Output JSONL file
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Checkpoint directory
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// Quota units this run may spend
    #[arg(long)]
    pub quota_budget: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum Order {
    Relevance,
    Date,
    #[value(name = "viewCount")]
    ViewCount,
    Rating,
}

impl Order {
    fn api_name(self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::Date => "date",
            Self::ViewCount => "viewCount",
            Self::Rating => "rating",
        }
    }
}

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum Replies {
    None,
    Inline,
    Full,
}

impl Replies {
    fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Inline => "inline",
            Self::Full => "full",
        }
    }
}

/// Merge CLI flags over config file values
fn to_args(cmd: HarvestCmd, config: &Config) -> HarvestArgs {
    let max = cmd
        .max_comments_per_video
        .unwrap_or(config.harvest.max_items_per_unit);
    HarvestArgs {
        video_ids: cmd.video_ids,
        queries_file: cmd.queries,
        queries: cmd.query,
        videos_per_query: cmd
            .videos_per_query
            .unwrap_or(config.harvest.units_per_query),
        max_comments_per_video: (max > 0).then_some(max),
        order: cmd
            .order
            .map_or_else(|| config.harvest.order.clone(), |o| o.api_name().to_string()),
        region: cmd.region.or_else(|| config.harvest.region.clone()),
        published_after: cmd.published_after,
        replies: cmd
            .replies
            .map_or_else(|| config.harvest.replies.clone(), |r| r.name().to_string()),
        out: cmd.out.unwrap_or_else(|| config.output.comments_file()),
        checkpoint_dir: cmd
            .checkpoint
            .unwrap_or_else(|| config.output.checkpoint_dir()),
        api_url: config.youtube.api_url.clone(),
        api_key: config.youtube.api_key.clone(),
        backoff: config.backoff.into(),
        quota_budget: cmd.quota_budget.or(config.quota.budget),
    }
}

pub fn run(cmd: HarvestCmd, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let args = to_args(cmd, config);
    log::info!("Output: {}", args.out.display());
    log::info!("Checkpoints: {}", args.checkpoint_dir.display());

    let harvest_config = commentline_youtube::Config::try_from(args)?;
    commentline_youtube::run(&harvest_config, progress.clone())
}
