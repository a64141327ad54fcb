//! YouTube harvester configuration

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use commentline_core::{
    BackoffPolicy, DiscoveryInput, HarvestConfig, ReplyMode, SearchFilters, SearchOrder,
};

use crate::video_id::extract_video_id;

/// Environment variable consulted when no key is configured
pub const API_KEY_ENV: &str = "YOUTUBE_API_KEY";

/// CLI-facing arguments for the harvest command (plain struct, no clap derive).
#[derive(Debug, Clone)]
pub struct HarvestArgs {
    /// Video ids or URLs
    pub video_ids: Vec<String>,
    /// File with one search query per line
    pub queries_file: Option<PathBuf>,
    /// Queries given inline
    pub queries: Vec<String>,
    pub videos_per_query: usize,
    pub max_comments_per_video: Option<u64>,
    pub order: String,
    pub region: Option<String>,
    pub published_after: Option<String>,
    pub replies: String,
    pub out: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub api_url: String,
    pub api_key: Option<String>,
    pub backoff: BackoffPolicy,
    pub quota_budget: Option<u64>,
}

/// Runtime configuration for one harvest run
#[derive(Debug)]
pub struct Config {
    pub harvest: HarvestConfig,
    pub out: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub api_url: String,
    pub api_key: String,
    pub backoff: BackoffPolicy,
    pub quota_budget: Option<u64>,
}

impl TryFrom<HarvestArgs> for Config {
    type Error = anyhow::Error;

    fn try_from(args: HarvestArgs) -> Result<Self, Self::Error> {
        let unit_ids: Vec<String> = args
            .video_ids
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                extract_video_id(s).ok_or_else(|| anyhow::anyhow!("Not a YouTube video id or URL: {s}"))
            })
            .collect::<anyhow::Result<_>>()?;

        let mut queries = args.queries.clone();
        if let Some(path) = &args.queries_file {
            queries.extend(load_queries(path)?);
        }
        anyhow::ensure!(
            !unit_ids.is_empty() || !queries.is_empty(),
            "Nothing to harvest: give video ids or at least one query"
        );

        let order = SearchOrder::from_name(&args.order)
            .ok_or_else(|| anyhow::anyhow!("Unknown order: {} (relevance, date, viewCount, rating)", args.order))?;
        let replies = ReplyMode::from_name(&args.replies)
            .ok_or_else(|| anyhow::anyhow!("Unknown reply mode: {} (none, inline, full)", args.replies))?;
        let published_after = args
            .published_after
            .as_deref()
            .map(parse_published_after)
            .transpose()?;

        let api_key = match args.api_key.filter(|k| !k.is_empty()) {
            Some(key) => key,
            None => std::env::var(API_KEY_ENV)
                .with_context(|| format!("{API_KEY_ENV} not set and no api_key configured"))?,
        };

        Ok(Self {
            harvest: HarvestConfig {
                discovery: DiscoveryInput {
                    unit_ids,
                    queries,
                    units_per_query: args.videos_per_query,
                    filters: SearchFilters {
                        region: args.region,
                        order,
                        published_after,
                    },
                },
                max_items_per_unit: args.max_comments_per_video,
                replies,
            },
            out: args.out,
            checkpoint_dir: args.checkpoint_dir,
            api_url: args.api_url,
            api_key,
            backoff: args.backoff,
            quota_budget: args.quota_budget,
        })
    }
}

/// One query per line; blank lines and `#` comments are skipped
pub fn load_queries(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read query file {}", path.display()))?;
    let queries: Vec<String> = parse_queries(&content);
    log::info!("{}: {} queries", path.display(), queries.len());
    Ok(queries)
}

fn parse_queries(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect()
}

/// RFC 3339 timestamp or a plain `YYYY-MM-DD` date (midnight UTC)
pub fn parse_published_after(s: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid --published-after: {s} (expected 2024-01-01 or RFC 3339)"))?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args() -> HarvestArgs {
        HarvestArgs {
            video_ids: Vec::new(),
            queries_file: None,
            queries: Vec::new(),
            videos_per_query: 200,
            max_comments_per_video: Some(2000),
            order: "relevance".into(),
            region: None,
            published_after: None,
            replies: "inline".into(),
            out: PathBuf::from("data/comments.jsonl"),
            checkpoint_dir: PathBuf::from("data/checkpoints"),
            api_url: "https://example.test".into(),
            api_key: Some("k".into()),
            backoff: BackoffPolicy::default(),
            quota_budget: None,
        }
    }

    #[test]
    fn urls_become_ids() {
        let mut a = args();
        a.video_ids = vec![
            "https://youtu.be/dQw4w9WgXcQ".into(),
            " ".into(),
            "aaaaaaaaaaa".into(),
        ];
        let cfg = Config::try_from(a).unwrap();
        assert_eq!(
            cfg.harvest.discovery.unit_ids,
            vec!["dQw4w9WgXcQ", "aaaaaaaaaaa"]
        );
    }

    #[test]
    fn bad_id_rejected() {
        let mut a = args();
        a.video_ids = vec!["not-a-video".into()];
        assert!(Config::try_from(a).is_err());
    }

    #[test]
    fn empty_input_rejected() {
        assert!(Config::try_from(args()).is_err());
    }

    #[test]
    fn query_file_skips_comments_and_blanks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queries.txt");
        std::fs::write(&path, "# topics\nrust tutorial\n\n  cooking  \n#skip\n").unwrap();

        let mut a = args();
        a.queries = vec!["inline".into()];
        a.queries_file = Some(path);
        let cfg = Config::try_from(a).unwrap();
        assert_eq!(
            cfg.harvest.discovery.queries,
            vec!["inline", "rust tutorial", "cooking"]
        );
    }

    #[test]
    fn filters_parsed() {
        let mut a = args();
        a.queries = vec!["q".into()];
        a.order = "viewCount".into();
        a.replies = "full".into();
        a.published_after = Some("2024-01-01".into());
        let cfg = Config::try_from(a).unwrap();
        let f = &cfg.harvest.discovery.filters;
        assert_eq!(f.order, SearchOrder::ViewCount);
        assert_eq!(
            f.published_after.unwrap().to_rfc3339(),
            "2024-01-01T00:00:00+00:00"
        );
        assert_eq!(cfg.harvest.replies, ReplyMode::Full);
    }

    #[test]
    fn unknown_order_rejected() {
        let mut a = args();
        a.queries = vec!["q".into()];
        a.order = "newest".into();
        assert!(Config::try_from(a).is_err());
    }

    #[test]
    fn rfc3339_published_after() {
        let dt = parse_published_after("2024-03-05T10:00:00+02:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-05T08:00:00+00:00");
        assert!(parse_published_after("yesterday").is_err());
    }
}
