//! Dedup ledger: item ids already delivered to the sink

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rustc_hash::FxHashSet;
use serde::Deserialize;

/// Initial capacity for per-line read buffer (typical comment line: 0.5–2KB)
const LINE_BUF_CAPACITY: usize = 4096;

/// O(1) item id membership using `FxHashSet`. Never shrinks during a run.
#[derive(Debug, Default)]
pub struct DedupLedger {
    set: FxHashSet<String>,
}

/// Only the id column is needed to rebuild the ledger
#[derive(Deserialize)]
struct IdOnly {
    comment_id: String,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self, item_id: &str) -> bool {
        self.set.contains(item_id)
    }

    /// Record `item_id`; returns `true` if it was not seen before
    pub fn mark(&mut self, item_id: &str) -> bool {
        if self.set.contains(item_id) {
            return false;
        }
        self.set.insert(item_id.to_string())
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Rebuild from prior JSONL output (crash recovery).
    ///
    /// A missing file yields an empty ledger. Lines that do not parse (a
    /// torn final line) are skipped with a warning.
    pub fn recover_from_jsonl(path: &Path) -> std::io::Result<Self> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No prior output at {}, starting empty", path.display());
                return Ok(Self::new());
            }
            Err(e) => return Err(e),
        };

        let mut reader = BufReader::new(file);
        let mut ledger = Self::new();
        let mut buf = String::with_capacity(LINE_BUF_CAPACITY);
        let mut line_no = 0usize;
        let mut bad_lines = 0usize;
        loop {
            buf.clear();
            if reader.read_line(&mut buf)? == 0 {
                break;
            }
            line_no += 1;
            let line = buf.trim_end();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<IdOnly>(line) {
                Ok(row) => {
                    ledger.set.insert(row.comment_id);
                }
                Err(e) => {
                    bad_lines += 1;
                    log::warn!("{}:{line_no}: unreadable line skipped: {e}", path.display());
                }
            }
        }

        log::info!(
            "Recovered {} seen item ids from {} ({bad_lines} unreadable lines)",
            ledger.len(),
            path.display()
        );
        Ok(ledger)
    }
}

impl FromIterator<String> for DedupLedger {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            set: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Item;
    use tempfile::TempDir;

    #[test]
    fn mark_reports_first_insert_only() {
        let mut ledger = DedupLedger::new();
        assert!(!ledger.seen("a"));
        assert!(ledger.mark("a"));
        assert!(!ledger.mark("a"));
        assert!(ledger.seen("a"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn recover_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = DedupLedger::recover_from_jsonl(&dir.path().join("none.jsonl")).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn recover_reads_ids_and_skips_torn_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("comments.jsonl");
        let a = serde_json::to_string(&Item::new("a", "v1")).unwrap();
        let b = serde_json::to_string(&Item::new("b", "v2").reply_to("a")).unwrap();
        std::fs::write(&path, format!("{a}\n\n{b}\n{{\"comment_id\":\"c")).unwrap();

        let ledger = DedupLedger::recover_from_jsonl(&path).unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger.seen("a"));
        assert!(ledger.seen("b"));
        assert!(!ledger.seen("c"));
    }

    #[test]
    fn from_iterator() {
        let ledger: DedupLedger = ["x".to_string(), "y".to_string(), "x".to_string()]
            .into_iter()
            .collect();
        assert_eq!(ledger.len(), 2);
    }
}
