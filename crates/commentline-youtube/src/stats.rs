//! Run and checkpoint reporting.
//!
//! TTY mode prints comfy-table summaries; non-TTY mode logs one line each.

use std::time::Duration;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use commentline_core::{CheckpointRecord, RunSummary, StatusCounts, UnitStatus, fmt_num};

fn table(title: &str) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new(title)
                .fg(Color::Cyan)
                .add_attribute(comfy_table::Attribute::Bold),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    table
}

/// End-of-run report
#[derive(Debug)]
pub struct HarvestReport<'a> {
    pub summary: &'a RunSummary,
    pub elapsed: Duration,
}

impl HarvestReport<'_> {
    /// Format summary table as a string.
    pub fn format_table(&self) -> String {
        let s = self.summary;
        let mut table = table("Harvest");

        table.add_row(vec![
            Cell::new("Units discovered"),
            Cell::new(fmt_num(s.units_discovered as u64)),
        ]);
        table.add_row(vec![
            Cell::new("Already done"),
            Cell::new(fmt_num(s.units_skipped as u64)),
        ]);
        table.add_row(vec![
            Cell::new("Completed").fg(Color::Green),
            Cell::new(format!("{}/{}", s.units_completed, s.units_processed)).fg(Color::Green),
        ]);
        if s.units_partial > 0 {
            table.add_row(vec![
                Cell::new("Partial (resumable)").fg(Color::Yellow),
                Cell::new(s.units_partial.to_string()).fg(Color::Yellow),
            ]);
        }
        if s.units_failed > 0 {
            table.add_row(vec![
                Cell::new("Failed (resumable)").fg(Color::Red),
                Cell::new(s.units_failed.to_string()).fg(Color::Red),
            ]);
        }
        table.add_row(vec![
            Cell::new("Comments written").fg(Color::Green),
            Cell::new(fmt_num(s.items_written)).fg(Color::Green),
        ]);
        table.add_row(vec![
            Cell::new("Duplicates skipped"),
            Cell::new(fmt_num(s.duplicates_skipped)),
        ]);
        table.add_row(vec![
            Cell::new("Quota units used"),
            Cell::new(fmt_num(s.quota_used)),
        ]);
        table.add_row(vec![
            Cell::new("Elapsed"),
            Cell::new(format!("{:.1}s", self.elapsed.as_secs_f64())),
        ]);
        if let Some(reason) = &s.reason {
            table.add_row(vec![
                Cell::new("Aborted").fg(Color::Red),
                Cell::new(reason).fg(Color::Red),
            ]);
        }

        format!("\n{table}")
    }

    pub fn print(&self) {
        eprintln!("{}", self.format_table());
    }

    /// Log minimal summary (non-TTY mode).
    pub fn log(&self) {
        let s = self.summary;
        log::info!(
            "Harvest {}: {}/{} units completed, {} comments, {} quota units [{:.1}s]",
            if s.aborted { "aborted" } else { "complete" },
            s.units_completed,
            s.units_processed,
            fmt_num(s.items_written),
            fmt_num(s.quota_used),
            self.elapsed.as_secs_f64()
        );
        if let Some(reason) = &s.reason {
            log::warn!("Reason: {reason}");
        }
    }
}

/// Checkpoint store overview for the `status` command
#[derive(Debug)]
pub struct StatusReport {
    pub counts: StatusCounts,
    /// Units left `in_progress`, most recently touched first
    pub unfinished: Vec<CheckpointRecord>,
}

/// Rows shown for unfinished units
const UNFINISHED_ROWS: usize = 10;

impl StatusReport {
    pub fn new(counts: StatusCounts, records: impl IntoIterator<Item = CheckpointRecord>) -> Self {
        let mut unfinished: Vec<CheckpointRecord> = records
            .into_iter()
            .filter(|r| r.status == UnitStatus::InProgress)
            .collect();
        unfinished.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Self { counts, unfinished }
    }

    pub fn format_table(&self) -> String {
        let c = &self.counts;
        let mut table = table("Checkpoints");
        table.add_row(vec![Cell::new("Units"), Cell::new(fmt_num(c.total() as u64))]);
        table.add_row(vec![
            Cell::new("Done").fg(Color::Green),
            Cell::new(format!(
                "{} ({} exhausted, {} capped, {} unavailable)",
                fmt_num(c.done as u64),
                c.exhausted,
                c.capped,
                c.unavailable
            ))
            .fg(Color::Green),
        ]);
        table.add_row(vec![
            Cell::new("In progress").fg(Color::Yellow),
            Cell::new(fmt_num(c.in_progress as u64)).fg(Color::Yellow),
        ]);
        table.add_row(vec![
            Cell::new("Comments collected"),
            Cell::new(fmt_num(c.items)),
        ]);

        let mut out = format!("\n{table}");
        if !self.unfinished.is_empty() {
            let mut detail = Table::new();
            detail
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new("Video").fg(Color::Cyan),
                    Cell::new("Comments").fg(Color::Cyan),
                    Cell::new("Pages").fg(Color::Cyan),
                    Cell::new("Updated").fg(Color::Cyan),
                ]);
            for r in self.unfinished.iter().take(UNFINISHED_ROWS) {
                detail.add_row(vec![
                    Cell::new(&r.unit_id),
                    Cell::new(fmt_num(r.items_collected_count)),
                    Cell::new(r.pages_fetched.to_string()),
                    Cell::new(r.updated_at.format("%Y-%m-%d %H:%M:%S").to_string()),
                ]);
            }
            out.push_str(&format!("\n{detail}"));
            if self.unfinished.len() > UNFINISHED_ROWS {
                out.push_str(&format!(
                    "\n... and {} more in progress",
                    self.unfinished.len() - UNFINISHED_ROWS
                ));
            }
        }
        out
    }

    pub fn print(&self) {
        eprintln!("{}", self.format_table());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harvest_table_mentions_abort_reason() {
        let summary = RunSummary {
            units_processed: 3,
            units_completed: 2,
            units_partial: 1,
            items_written: 1_234,
            aborted: true,
            reason: Some("quota exceeded: daily".into()),
            ..RunSummary::default()
        };
        let report = HarvestReport {
            summary: &summary,
            elapsed: Duration::from_secs(3),
        };
        let text = report.format_table();
        assert!(text.contains("1,234"));
        assert!(text.contains("quota exceeded: daily"));
        assert!(text.contains("Partial"));
        assert!(!text.contains("Failed"));
    }

    #[test]
    fn status_lists_only_unfinished() {
        let mut done = CheckpointRecord::new("done1");
        done.finish(commentline_core::Finish::Exhausted);
        let mut open = CheckpointRecord::new("open1");
        open.status = UnitStatus::InProgress;
        open.items_collected_count = 40;

        let counts = StatusCounts {
            done: 1,
            in_progress: 1,
            exhausted: 1,
            items: 40,
            ..StatusCounts::default()
        };
        let report = StatusReport::new(counts, vec![done, open]);
        assert_eq!(report.unfinished.len(), 1);
        let text = report.format_table();
        assert!(text.contains("open1"));
        assert!(!text.contains("done1"));
    }
}
