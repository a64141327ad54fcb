//! Main execution logic for the YouTube harvester

use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use commentline_core::{
    CheckpointStore, DedupLedger, FileKv, Governor, Harvester, JsonlSink, RunSummary,
    SharedProgress, is_shutdown_requested,
};

use crate::api::YouTubeClient;
use crate::config::Config;
use crate::stats::{HarvestReport, StatusReport};

/// Main entry point for the harvest command
pub fn run(config: &Config, progress: SharedProgress) -> anyhow::Result<ExitCode> {
    let started = Instant::now();
    let summary = harvest(config, progress.clone())?;

    let report = HarvestReport {
        summary: &summary,
        elapsed: started.elapsed(),
    };
    if progress.is_tty() {
        report.print();
    } else {
        report.log();
    }

    let code = exit_status(&summary, is_shutdown_requested());
    if code == 0 {
        log::info!("commentline harvest completed");
    }
    Ok(ExitCode::from(code))
}

/// 130 after a signal, 1 after any other abort or when every processed unit
/// failed, success otherwise
fn exit_status(summary: &RunSummary, signalled: bool) -> u8 {
    if summary.aborted {
        if signalled {
            log::warn!("Shutdown requested, checkpoints saved");
            return 130;
        }
        log::error!("Harvest aborted, rerun to resume");
        return 1;
    }
    if summary.units_failed > 0 {
        log::warn!(
            "{} units failed and stay resumable, rerun to retry",
            summary.units_failed
        );
        if summary.units_completed == 0 {
            log::error!("No unit completed");
            return 1;
        }
    }
    0
}

/// Open the durable state, run the harvester once and return its summary
pub fn harvest(config: &Config, progress: SharedProgress) -> anyhow::Result<RunSummary> {
    if let Some(parent) = config.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Cannot create output directory")?;
    }

    log::info!(
        "commentline starting: videos={}, queries={}, max_comments_per_video={}, replies={:?}",
        config.harvest.discovery.unit_ids.len(),
        config.harvest.discovery.queries.len(),
        config
            .harvest
            .max_items_per_unit
            .map_or_else(|| "unlimited".to_string(), |n| n.to_string()),
        config.harvest.replies
    );

    let kv = FileKv::open(&config.checkpoint_dir).with_context(|| {
        format!(
            "Cannot open checkpoint directory {}",
            config.checkpoint_dir.display()
        )
    })?;
    let checkpoints = CheckpointStore::open(kv).context("Cannot load checkpoints")?;

    // the output file is the source of truth for what was already written
    let ledger = DedupLedger::recover_from_jsonl(&config.out)
        .with_context(|| format!("Cannot scan {}", config.out.display()))?;
    log::info!("Ledger recovered: {} comments already on disk", ledger.len());

    let mut sink = JsonlSink::open(&config.out)
        .with_context(|| format!("Cannot open {}", config.out.display()))?;

    let governor = Governor::new(config.backoff.clone()).with_budget(config.quota_budget);
    let client = YouTubeClient::new(&config.api_url, &config.api_key);

    let mut harvester = Harvester::new(config.harvest.clone(), governor, checkpoints, ledger)
        .with_progress(progress);
    let summary = harvester.run(&client, &mut sink);

    let stats = harvester.governor().stats();
    log::debug!(
        "Governor: {} calls, {} retries, {} rate limited",
        stats.calls,
        stats.retries,
        stats.rate_limited
    );
    Ok(summary)
}

/// Summarize the checkpoint directory without touching the network
pub fn status(checkpoint_dir: &Path) -> anyhow::Result<StatusReport> {
    let kv = FileKv::open(checkpoint_dir)
        .with_context(|| format!("Cannot open checkpoint directory {}", checkpoint_dir.display()))?;
    let store = CheckpointStore::open(kv).context("Cannot load checkpoints")?;
    let records = store.load().context("Cannot read checkpoints")?;
    Ok(StatusReport::new(store.summarize(), records.into_values()))
}
