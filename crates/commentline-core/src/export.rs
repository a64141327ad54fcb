//! JSONL → Parquet export of harvested comments

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::{Arc, LazyLock};

use arrow::array::{ArrayRef, BooleanArray, RecordBatch, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;

use crate::progress::fmt_num;
use crate::sink::ParquetSink;
use crate::types::Item;

/// Rows buffered before a `RecordBatch` is flushed
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// Initial capacity for per-line read buffer
const LINE_BUF_CAPACITY: usize = 4096;

/// comments.parquet: one row per comment or reply
pub fn comments_schema() -> &'static Arc<Schema> {
    static SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
        Arc::new(Schema::new(vec![
            Field::new("comment_id", DataType::Utf8, false),
            Field::new("video_id", DataType::Utf8, false),
            Field::new("parent_id", DataType::Utf8, true),
            Field::new("is_reply", DataType::Boolean, false),
            Field::new("author", DataType::Utf8, true),
            Field::new("text", DataType::Utf8, false),
            Field::new("likes", DataType::UInt64, false),
            Field::new("published_at", DataType::Utf8, true),
            Field::new("updated_at", DataType::Utf8, true),
            Field::new("reply_count", DataType::UInt64, false),
        ]))
    });
    &SCHEMA
}

/// Column buffers for [`comments_schema`]
#[derive(Debug, Default)]
pub struct CommentsAccumulator {
    comment_id: Vec<String>,
    video_id: Vec<String>,
    parent_id: Vec<Option<String>>,
    is_reply: Vec<bool>,
    author: Vec<Option<String>>,
    text: Vec<String>,
    likes: Vec<u64>,
    published_at: Vec<Option<String>>,
    updated_at: Vec<Option<String>>,
    reply_count: Vec<u64>,
}

impl CommentsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: Item) {
        self.comment_id.push(item.item_id);
        self.video_id.push(item.unit_id);
        self.parent_id.push(item.parent_id);
        self.is_reply.push(item.is_reply);
        self.author.push(item.author);
        self.text.push(item.text);
        self.likes.push(item.like_count);
        self.published_at.push(item.published_at);
        self.updated_at.push(item.updated_at);
        self.reply_count.push(item.reply_count);
    }

    pub fn len(&self) -> usize {
        self.comment_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comment_id.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= DEFAULT_BATCH_SIZE
    }

    /// Take buffered rows as a RecordBatch, resetting internal state
    pub fn take_batch(&mut self) -> Result<RecordBatch, ArrowError> {
        let arrays: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(std::mem::take(&mut self.comment_id))),
            Arc::new(StringArray::from(std::mem::take(&mut self.video_id))),
            Arc::new(StringArray::from(std::mem::take(&mut self.parent_id))),
            Arc::new(BooleanArray::from(std::mem::take(&mut self.is_reply))),
            Arc::new(StringArray::from(std::mem::take(&mut self.author))),
            Arc::new(StringArray::from(std::mem::take(&mut self.text))),
            Arc::new(UInt64Array::from(std::mem::take(&mut self.likes))),
            Arc::new(StringArray::from(std::mem::take(&mut self.published_at))),
            Arc::new(StringArray::from(std::mem::take(&mut self.updated_at))),
            Arc::new(UInt64Array::from(std::mem::take(&mut self.reply_count))),
        ];
        RecordBatch::try_new(comments_schema().clone(), arrays)
    }
}

/// Statistics from one export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub lines_scanned: usize,
    pub rows_written: usize,
    /// Lines that failed to parse (skipped)
    pub bad_lines: usize,
}

/// Convert harvested JSONL into a zstd-compressed Parquet file.
///
/// The output appears atomically (tmp → rename); unparseable lines are
/// skipped with a warning.
pub fn export_jsonl_to_parquet(
    input: &Path,
    output: &Path,
    zstd_level: i32,
) -> io::Result<ExportStats> {
    let mut reader = BufReader::new(File::open(input)?);
    let mut sink = ParquetSink::new(output, comments_schema(), zstd_level)?;
    let mut acc = CommentsAccumulator::new();
    let mut stats = ExportStats::default();
    let mut buf = String::with_capacity(LINE_BUF_CAPACITY);

    loop {
        buf.clear();
        if reader.read_line(&mut buf)? == 0 {
            break;
        }
        stats.lines_scanned += 1;
        let line = buf.trim_end();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Item>(line) {
            Ok(item) => {
                acc.push(item);
                stats.rows_written += 1;
                if acc.is_full() {
                    sink.write_batch(&acc.take_batch().map_err(io::Error::other)?)?;
                }
            }
            Err(e) => {
                stats.bad_lines += 1;
                log::warn!("{}:{}: skipped: {e}", input.display(), stats.lines_scanned);
            }
        }
    }
    if !acc.is_empty() {
        sink.write_batch(&acc.take_batch().map_err(io::Error::other)?)?;
    }
    sink.finalize()?;

    log::info!(
        "Exported {} rows to {}",
        fmt_num(stats.rows_written as u64),
        output.display()
    );
    Ok(stats)
}
