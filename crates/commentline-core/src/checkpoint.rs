//! Per-unit progress records persisted in a [`DurableKv`]
//!
//! Key layout:
//! ```text
//! unit:{unit_id}          CheckpointRecord (JSON)
//! discovery:{input-hash}  Vec<SourceUnit> (JSON), cached discovery result
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::kv::{DurableKv, KvError};
use crate::types::{Cursor, SourceUnit};

const UNIT_PREFIX: &str = "unit:";
const DISCOVERY_PREFIX: &str = "discovery:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    InProgress,
    Done,
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        })
    }
}

/// Why a unit reached `done`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Finish {
    /// Stream ended naturally
    Exhausted,
    /// Per-unit item cap reached
    Capped,
    /// Remote reported nothing to harvest (comments disabled, not found)
    Unavailable,
}

impl std::fmt::Display for Finish {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Exhausted => "exhausted",
            Self::Capped => "capped",
            Self::Unavailable => "unavailable",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub unit_id: String,
    pub status: UnitStatus,
    /// Cursor of the next page to fetch; None before the first page
    pub last_cursor: Option<Cursor>,
    /// Items emitted by the paginator for this unit (counts toward the cap)
    pub items_collected_count: u64,
    #[serde(default)]
    pub pages_fetched: u64,
    #[serde(default)]
    pub finish: Option<Finish>,
    pub updated_at: DateTime<Utc>,
}

impl CheckpointRecord {
    pub fn new(unit_id: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            status: UnitStatus::Pending,
            last_cursor: None,
            items_collected_count: 0,
            pages_fetched: 0,
            finish: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == UnitStatus::Done
    }

    /// Transition to `done`
    pub fn finish(&mut self, finish: Finish) {
        self.status = UnitStatus::Done;
        self.finish = Some(finish);
    }
}

/// Aggregate view over all records
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub done: usize,
    pub exhausted: usize,
    pub capped: usize,
    pub unavailable: usize,
    pub items: u64,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.done
    }
}

/// Checkpoint store with an in-memory index loaded at open.
///
/// Only the orchestrator mutates records; every `save` goes straight to the
/// backing store before returning.
pub struct CheckpointStore<K> {
    kv: K,
    records: FxHashMap<String, CheckpointRecord>,
}

impl<K> std::fmt::Debug for CheckpointStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointStore")
            .field("records", &self.records.len())
            .finish_non_exhaustive()
    }
}

impl<K: DurableKv> CheckpointStore<K> {
    /// Open over `kv`, loading every committed record
    pub fn open(kv: K) -> Result<Self, KvError> {
        let records = read_all(&kv)?
            .into_iter()
            .collect::<FxHashMap<_, _>>();
        log::debug!("Loaded {} checkpoint records", records.len());
        Ok(Self { kv, records })
    }

    /// Read every record from the backing store (sorted by unit id)
    pub fn load(&self) -> Result<BTreeMap<String, CheckpointRecord>, KvError> {
        read_all(&self.kv)
    }

    pub fn get(&self, unit_id: &str) -> Option<&CheckpointRecord> {
        self.records.get(unit_id)
    }

    pub fn is_done(&self, unit_id: &str) -> bool {
        self.records.get(unit_id).is_some_and(CheckpointRecord::is_done)
    }

    /// Existing record moved to `in_progress`, or a fresh one created and persisted
    pub fn load_or_create(&mut self, unit_id: &str) -> Result<CheckpointRecord, KvError> {
        let mut record = self
            .records
            .get(unit_id)
            .cloned()
            .unwrap_or_else(|| CheckpointRecord::new(unit_id));
        if record.status == UnitStatus::Pending {
            record.status = UnitStatus::InProgress;
            self.save(&mut record)?;
        }
        Ok(record)
    }

    /// Persist `record` (atomic per record) and refresh its timestamp
    pub fn save(&mut self, record: &mut CheckpointRecord) -> Result<(), KvError> {
        record.updated_at = Utc::now();
        let bytes = serde_json::to_vec(record).map_err(|e| KvError::Corrupt {
            key: record.unit_id.clone(),
            reason: e.to_string(),
        })?;
        self.kv.put(&unit_key(&record.unit_id), &bytes)?;
        self.records.insert(record.unit_id.clone(), record.clone());
        Ok(())
    }

    pub fn summarize(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for record in self.records.values() {
            match record.status {
                UnitStatus::Pending => counts.pending += 1,
                UnitStatus::InProgress => counts.in_progress += 1,
                UnitStatus::Done => counts.done += 1,
            }
            match record.finish {
                Some(Finish::Exhausted) => counts.exhausted += 1,
                Some(Finish::Capped) => counts.capped += 1,
                Some(Finish::Unavailable) => counts.unavailable += 1,
                None => {}
            }
            counts.items += record.items_collected_count;
        }
        counts
    }

    /// Cached discovery result for `input_hash`, if any
    pub fn discovery(&self, input_hash: &str) -> Result<Option<Vec<SourceUnit>>, KvError> {
        let key = format!("{DISCOVERY_PREFIX}{input_hash}");
        match self.kv.get(&key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| KvError::Corrupt {
                    key,
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    pub fn save_discovery(&mut self, input_hash: &str, units: &[SourceUnit]) -> Result<(), KvError> {
        let key = format!("{DISCOVERY_PREFIX}{input_hash}");
        let bytes = serde_json::to_vec(units).map_err(|e| KvError::Corrupt {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        self.kv.put(&key, &bytes)
    }

    /// Give back the backing store
    pub fn into_kv(self) -> K {
        self.kv
    }
}

fn unit_key(unit_id: &str) -> String {
    format!("{UNIT_PREFIX}{unit_id}")
}

fn read_all<K: DurableKv>(kv: &K) -> Result<BTreeMap<String, CheckpointRecord>, KvError> {
    let mut out = BTreeMap::new();
    for key in kv.keys(UNIT_PREFIX)? {
        let Some(bytes) = kv.get(&key)? else {
            continue;
        };
        let record: CheckpointRecord =
            serde_json::from_slice(&bytes).map_err(|e| KvError::Corrupt {
                key: key.clone(),
                reason: e.to_string(),
            })?;
        out.insert(record.unit_id.clone(), record);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{FileKv, MemoryKv};
    use tempfile::TempDir;

    #[test]
    fn load_or_create_persists_in_progress() {
        let mut store = CheckpointStore::open(MemoryKv::new()).unwrap();
        let record = store.load_or_create("v1").unwrap();
        assert_eq!(record.status, UnitStatus::InProgress);
        assert!(record.last_cursor.is_none());

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded["v1"].status, UnitStatus::InProgress);
        assert!(!store.is_done("v1"));
    }

    #[test]
    fn load_or_create_keeps_existing_cursor() {
        let mut store = CheckpointStore::open(MemoryKv::new()).unwrap();
        let mut record = store.load_or_create("v1").unwrap();
        record.last_cursor = Some(Cursor::new("page-3"));
        record.items_collected_count = 200;
        store.save(&mut record).unwrap();

        let again = store.load_or_create("v1").unwrap();
        assert_eq!(again.last_cursor, Some(Cursor::new("page-3")));
        assert_eq!(again.items_collected_count, 200);
    }

    #[test]
    fn done_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = CheckpointStore::open(FileKv::open(dir.path()).unwrap()).unwrap();
            let mut record = store.load_or_create("abc").unwrap();
            record.items_collected_count = 12;
            record.finish(Finish::Exhausted);
            store.save(&mut record).unwrap();
        }
        let store = CheckpointStore::open(FileKv::open(dir.path()).unwrap()).unwrap();
        assert!(store.is_done("abc"));
        assert_eq!(store.get("abc").unwrap().finish, Some(Finish::Exhausted));
        assert!(!store.is_done("other"));
    }

    #[test]
    fn summarize_counts_statuses() {
        let mut store = CheckpointStore::open(MemoryKv::new()).unwrap();
        let mut a = store.load_or_create("a").unwrap();
        a.items_collected_count = 5;
        a.finish(Finish::Capped);
        store.save(&mut a).unwrap();
        let mut b = store.load_or_create("b").unwrap();
        b.items_collected_count = 3;
        store.save(&mut b).unwrap();

        let counts = store.summarize();
        assert_eq!(counts.done, 1);
        assert_eq!(counts.in_progress, 1);
        assert_eq!(counts.capped, 1);
        assert_eq!(counts.items, 8);
        assert_eq!(counts.total(), 2);
    }

    #[test]
    fn discovery_cache_roundtrip() {
        let mut store = CheckpointStore::open(MemoryKv::new()).unwrap();
        assert!(store.discovery("h1").unwrap().is_none());
        let units = vec![SourceUnit::explicit("a"), SourceUnit::explicit("b")];
        store.save_discovery("h1", &units).unwrap();
        assert_eq!(store.discovery("h1").unwrap(), Some(units));
        // discovery entries are not unit records
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn record_status_serializes_snake_case() {
        let mut record = CheckpointRecord::new("v");
        record.status = UnitStatus::InProgress;
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "in_progress");
    }
}
