//! Harvest orchestrator: discovery, then each unit paginated to completion
//!
//! Commit order per page: new items to the sink, sink flush (durable), then
//! the checkpoint. A crash between the two leaves items on disk past the
//! checkpointed cursor; on restart the ledger (rebuilt from the sink) filters
//! them, so nothing is written twice and nothing is lost.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indicatif::ProgressBar;
use serde::Serialize;

use crate::checkpoint::{CheckpointRecord, CheckpointStore, Finish};
use crate::client::RemoteClient;
use crate::discovery::{DiscoveryInput, discover};
use crate::error::HarvestError;
use crate::governor::Governor;
use crate::kv::DurableKv;
use crate::ledger::DedupLedger;
use crate::paginator::Paginator;
use crate::progress::{ProgressContext, SharedProgress, fmt_num};
use crate::shutdown::is_shutdown_requested;
use crate::sink::Sink;
use crate::types::{ReplyMode, SourceUnit};

/// Run-level settings
#[derive(Debug, Clone, Default)]
pub struct HarvestConfig {
    pub discovery: DiscoveryInput,
    /// Per-unit item cap (top-level comments and replies both count)
    pub max_items_per_unit: Option<u64>,
    pub replies: ReplyMode,
}

/// Outcome of a run; always produced, even when the run aborts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub units_discovered: usize,
    /// Already `done` in the checkpoint store
    pub units_skipped: usize,
    pub units_processed: usize,
    /// Reached `done` during this run (exhausted, capped or unavailable)
    pub units_completed: usize,
    /// Left `in_progress` by a stop request or an abort
    pub units_partial: usize,
    /// Left `in_progress` after a transient or malformed-page failure
    pub units_failed: usize,
    pub items_written: u64,
    pub duplicates_skipped: u64,
    pub quota_used: u64,
    pub aborted: bool,
    pub reason: Option<String>,
}

impl RunSummary {
    fn abort(&mut self, reason: impl Into<String>) {
        self.aborted = true;
        self.reason = Some(reason.into());
    }
}

/// How a single unit ended within this run
enum UnitOutcome {
    Completed(Finish),
    Stopped,
    Failed(HarvestError),
}

/// Sequential harvester owning the governor, checkpoints and dedup ledger.
pub struct Harvester<K> {
    config: HarvestConfig,
    governor: Governor,
    checkpoints: CheckpointStore<K>,
    ledger: DedupLedger,
    stop: Arc<AtomicBool>,
    progress: SharedProgress,
}

impl<K> std::fmt::Debug for Harvester<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harvester")
            .field("config", &self.config)
            .field("governor", &self.governor)
            .field("ledger", &self.ledger.len())
            .finish_non_exhaustive()
    }
}

impl<K: DurableKv> Harvester<K> {
    pub fn new(
        config: HarvestConfig,
        governor: Governor,
        checkpoints: CheckpointStore<K>,
        ledger: DedupLedger,
    ) -> Self {
        Self {
            config,
            governor,
            checkpoints,
            ledger,
            stop: Arc::new(AtomicBool::new(false)),
            progress: Arc::new(ProgressContext::hidden()),
        }
    }

    /// Flag checked between pages; the process-wide shutdown flag is always honored too
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_progress(mut self, progress: SharedProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn governor(&self) -> &Governor {
        &self.governor
    }

    pub fn checkpoints(&self) -> &CheckpointStore<K> {
        &self.checkpoints
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    pub fn into_checkpoints(self) -> CheckpointStore<K> {
        self.checkpoints
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed) || is_shutdown_requested()
    }

    /// Discover units and harvest each one not already done.
    ///
    /// Unit-local failures are counted and skipped. Quota exhaustion and
    /// sink/checkpoint I/O failures abort the run with checkpoints intact.
    pub fn run<C, S>(&mut self, client: &C, sink: &mut S) -> RunSummary
    where
        C: RemoteClient + ?Sized,
        S: Sink + ?Sized,
    {
        let mut summary = RunSummary::default();

        let units = match self.resolve_units(client) {
            Ok(units) => units,
            Err(e) => {
                log::error!("Discovery failed: {e}");
                summary.abort(e.to_string());
                summary.quota_used = self.governor.stats().units_used;
                return summary;
            }
        };
        summary.units_discovered = units.len();
        log::info!(
            "Harvesting {} units ({} seen items in ledger)",
            fmt_num(units.len() as u64),
            fmt_num(self.ledger.len() as u64)
        );

        for unit in &units {
            if self.should_stop() {
                summary.abort("stop requested");
                break;
            }
            if self.checkpoints.is_done(&unit.unit_id) {
                log::debug!("{}: already done, skipping", unit.unit_id);
                summary.units_skipped += 1;
                continue;
            }

            summary.units_processed += 1;
            match self.harvest_unit(unit, client, sink, &mut summary) {
                Ok(UnitOutcome::Completed(_)) => summary.units_completed += 1,
                Ok(UnitOutcome::Stopped) => {
                    log::warn!("{}: stop requested, progress saved", unit.unit_id);
                    summary.units_partial += 1;
                    summary.abort("stop requested");
                    break;
                }
                Ok(UnitOutcome::Failed(e)) => {
                    log::warn!("{}: left in progress: {e}", unit.unit_id);
                    summary.units_failed += 1;
                }
                Err(e) => {
                    log::error!("{}: aborting run: {e}", unit.unit_id);
                    summary.units_partial += 1;
                    summary.abort(e.to_string());
                    break;
                }
            }
        }

        summary.quota_used = self.governor.stats().units_used;
        log::info!(
            "Run finished: {} completed, {} failed, {} items written, {} quota units",
            summary.units_completed,
            summary.units_failed,
            fmt_num(summary.items_written),
            fmt_num(summary.quota_used)
        );
        summary
    }

    /// Discovery result, reused from the checkpoint store when the inputs match
    fn resolve_units<C: RemoteClient + ?Sized>(
        &mut self,
        client: &C,
    ) -> Result<Vec<SourceUnit>, HarvestError> {
        let input = &self.config.discovery;
        if input.queries.is_empty() {
            let found = discover(input, client, &mut self.governor, &ProgressBar::hidden())?;
            return Ok(found.units);
        }

        let key = input.cache_key();
        if let Some(units) = self.checkpoints.discovery(&key)? {
            log::info!("Reusing cached discovery {key}: {} units", units.len());
            return Ok(units);
        }

        let pb = self.progress.stage_line("discover");
        let found = discover(input, client, &mut self.governor, &pb);
        pb.finish_and_clear();
        let found = found?;

        if found.skipped_queries == 0 {
            self.checkpoints.save_discovery(&key, &found.units)?;
        } else {
            log::warn!(
                "{} queries failed; discovery will be retried next run",
                found.skipped_queries
            );
        }
        Ok(found.units)
    }

    fn harvest_unit<C, S>(
        &mut self,
        unit: &SourceUnit,
        client: &C,
        sink: &mut S,
        summary: &mut RunSummary,
    ) -> Result<UnitOutcome, HarvestError>
    where
        C: RemoteClient + ?Sized,
        S: Sink + ?Sized,
    {
        let mut record = self.checkpoints.load_or_create(&unit.unit_id)?;
        let cap = self.config.max_items_per_unit;
        log::debug!(
            "{}: resuming at {} ({} items, {} pages)",
            record.unit_id,
            record
                .last_cursor
                .as_ref()
                .map_or("first page", |c| c.as_str()),
            record.items_collected_count,
            record.pages_fetched
        );

        let pb = self
            .progress
            .unit_bar(&record.unit_id, record.items_collected_count, cap);
        self.governor.attach_progress(&pb);
        let mut pager = Paginator::new(
            record.unit_id.clone(),
            record.last_cursor.clone(),
            record.items_collected_count,
        )
        .with_cap(cap)
        .with_replies(self.config.replies);

        let result = self.drive_unit(&mut record, &mut pager, client, sink, summary, &pb);
        pb.finish_and_clear();
        self.governor.attach_progress(&ProgressBar::hidden());

        if let Ok(UnitOutcome::Completed(finish)) = &result {
            log::info!(
                "{}: done ({finish}, {} items, {} pages)",
                record.unit_id,
                record.items_collected_count,
                record.pages_fetched
            );
        }
        result
    }

    fn drive_unit<C, S>(
        &mut self,
        record: &mut CheckpointRecord,
        pager: &mut Paginator,
        client: &C,
        sink: &mut S,
        summary: &mut RunSummary,
        pb: &ProgressBar,
    ) -> Result<UnitOutcome, HarvestError>
    where
        C: RemoteClient + ?Sized,
        S: Sink + ?Sized,
    {
        loop {
            if self.should_stop() {
                return Ok(UnitOutcome::Stopped);
            }

            let page = match pager.next_page(client, &mut self.governor) {
                Ok(Some(page)) => page,
                Ok(None) => {
                    // Stream already ended on the last committed page, or the
                    // cap was reached before any fetch
                    let finish = pager.finish().unwrap_or(Finish::Exhausted);
                    if !record.is_done() {
                        record.finish(finish);
                        self.checkpoints.save(record)?;
                    }
                    return Ok(UnitOutcome::Completed(finish));
                }
                Err(HarvestError::Unavailable(msg)) => {
                    log::info!("{}: unavailable ({msg}), marking done", record.unit_id);
                    record.finish(Finish::Unavailable);
                    self.checkpoints.save(record)?;
                    return Ok(UnitOutcome::Completed(Finish::Unavailable));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => return Ok(UnitOutcome::Failed(e)),
            };

            let mut written = 0u64;
            for item in &page.items {
                if self.ledger.mark(&item.item_id) {
                    sink.write(item)?;
                    written += 1;
                } else {
                    summary.duplicates_skipped += 1;
                }
            }
            sink.flush()?;
            summary.items_written += written;

            record.last_cursor = page.next_cursor;
            record.items_collected_count = pager.collected();
            record.pages_fetched += 1;
            if let Some(finish) = pager.finish() {
                record.finish(finish);
            }
            self.checkpoints.save(record)?;

            pb.set_position(record.items_collected_count);
            log::debug!(
                "{}: page {} committed ({written} new, {} total)",
                record.unit_id,
                record.pages_fetched,
                record.items_collected_count
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallError;
    use crate::governor::{BackoffPolicy, Sleeper};
    use crate::kv::MemoryKv;
    use crate::types::{
        Cursor, Item, ReplyPage, SearchFilters, SearchPage, Thread, ThreadPage,
    };
    use std::time::Duration;

    struct NoSleep;
    impl Sleeper for NoSleep {
        fn sleep(&self, _: Duration) {}
    }

    /// Every unit has two single-comment pages; "gone" has comments disabled
    struct TwoPages;

    impl RemoteClient for TwoPages {
        fn search(
            &self,
            _: &str,
            _: &SearchFilters,
            _: Option<&Cursor>,
        ) -> Result<SearchPage, CallError> {
            Ok(SearchPage::default())
        }

        fn list_comments(
            &self,
            unit_id: &str,
            cursor: Option<&Cursor>,
        ) -> Result<ThreadPage, CallError> {
            if unit_id == "gone" {
                return Err(CallError::Unavailable("commentsDisabled".into()));
            }
            let (id, next) = match cursor {
                None => (format!("{unit_id}-1"), Some(Cursor::new("2"))),
                Some(_) => (format!("{unit_id}-2"), None),
            };
            Ok(ThreadPage {
                threads: vec![Thread {
                    top: Item::new(id, unit_id),
                    replies: Vec::new(),
                    total_reply_count: 0,
                }],
                next_cursor: next,
            })
        }

        fn list_replies(&self, _: &str, _: Option<&Cursor>) -> Result<ReplyPage, CallError> {
            Ok(ReplyPage::default())
        }
    }

    fn harvester(ids: &[&str]) -> Harvester<MemoryKv> {
        let config = HarvestConfig {
            discovery: DiscoveryInput {
                unit_ids: ids.iter().map(|s| s.to_string()).collect(),
                ..DiscoveryInput::default()
            },
            ..HarvestConfig::default()
        };
        let governor = Governor::new(BackoffPolicy::default()).with_sleeper(NoSleep);
        let checkpoints = CheckpointStore::open(MemoryKv::new()).unwrap();
        Harvester::new(config, governor, checkpoints, DedupLedger::new())
    }

    #[test]
    fn completes_units_and_counts() {
        let mut h = harvester(&["a", "b"]);
        let mut sink: Vec<Item> = Vec::new();
        let summary = h.run(&TwoPages, &mut sink);

        assert_eq!(summary.units_discovered, 2);
        assert_eq!(summary.units_completed, 2);
        assert_eq!(summary.items_written, 4);
        assert_eq!(summary.quota_used, 4);
        assert!(!summary.aborted);
        let record = h.checkpoints().get("a").unwrap();
        assert_eq!(record.finish, Some(Finish::Exhausted));
        assert_eq!(record.pages_fetched, 2);
    }

    #[test]
    fn unavailable_unit_finalized() {
        let mut h = harvester(&["gone", "a"]);
        let mut sink: Vec<Item> = Vec::new();
        let summary = h.run(&TwoPages, &mut sink);

        assert_eq!(summary.units_completed, 2);
        assert_eq!(summary.units_failed, 0);
        let record = h.checkpoints().get("gone").unwrap();
        assert!(record.is_done());
        assert_eq!(record.finish, Some(Finish::Unavailable));
        assert_eq!(record.items_collected_count, 0);
    }

    #[test]
    fn preset_stop_flag_touches_nothing() {
        let stop = Arc::new(AtomicBool::new(true));
        let mut h = harvester(&["a"]).with_stop_flag(stop);
        let mut sink: Vec<Item> = Vec::new();
        let summary = h.run(&TwoPages, &mut sink);

        assert!(summary.aborted);
        assert_eq!(summary.reason.as_deref(), Some("stop requested"));
        assert_eq!(summary.units_processed, 0);
        assert!(sink.is_empty());
        assert!(h.checkpoints().get("a").is_none());
    }
}
