//! Output sinks: append-only JSONL writer and Parquet file writer

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::Schema;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

use crate::types::Item;

/// Write buffer for the JSONL sink (one page rarely exceeds this)
const JSONL_BUF_SIZE: usize = 256 * 1024;

/// Chunk size for scanning backwards over a torn tail
const TAIL_SCAN_CHUNK: u64 = 64 * 1024;

/// Append-only destination for harvested items.
///
/// Uniqueness is enforced upstream by the dedup ledger. `flush` must make
/// every written item durable: the orchestrator commits a checkpoint right
/// after it returns.
pub trait Sink {
    fn write(&mut self, item: &Item) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Sink for Vec<Item> {
    fn write(&mut self, item: &Item) -> io::Result<()> {
        self.push(item.clone());
        Ok(())
    }
}

/// One JSON object per line, appended to a single file
pub struct JsonlSink {
    writer: BufWriter<File>,
    path: PathBuf,
    written: usize,
}

impl std::fmt::Debug for JsonlSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlSink")
            .field("path", &self.path)
            .field("written", &self.written)
            .finish_non_exhaustive()
    }
}

impl JsonlSink {
    /// Open for append, creating parent directories.
    ///
    /// A last line without its terminating newline (process killed mid-write)
    /// is cut off; the items it held are not in the dedup ledger either, so
    /// they are fetched again from the last checkpointed cursor.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let removed = repair_torn_tail(&mut file)?;
        if removed > 0 {
            log::warn!(
                "Dropped {removed} bytes of incomplete trailing line from {}",
                path.display()
            );
        }
        Ok(Self {
            writer: BufWriter::with_capacity(JSONL_BUF_SIZE, file),
            path: path.to_path_buf(),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Items written through this handle
    pub fn written(&self) -> usize {
        self.written
    }
}

impl Sink for JsonlSink {
    fn write(&mut self, item: &Item) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, item).map_err(io::Error::other)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()
    }
}

impl Drop for JsonlSink {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            log::error!("Failed to flush {}: {e}", self.path.display());
        }
    }
}

/// Truncate the file after its last newline; returns bytes removed
fn repair_torn_tail(file: &mut File) -> io::Result<u64> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(0);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(0);
    }

    let mut end = len;
    let mut keep = 0u64;
    let mut buf = vec![0u8; TAIL_SCAN_CHUNK as usize];
    while end > 0 {
        let start = end.saturating_sub(TAIL_SCAN_CHUNK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            keep = start + pos as u64 + 1;
            break;
        }
        end = start;
    }
    file.set_len(keep)?;
    Ok(len - keep)
}

/// Buffered parquet writer with atomic tmp→rename
pub struct ParquetSink {
    writer: ArrowWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    row_count: usize,
}

impl std::fmt::Debug for ParquetSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParquetSink")
            .field("final_path", &self.final_path)
            .field("row_count", &self.row_count)
            .finish_non_exhaustive()
    }
}

impl ParquetSink {
    /// Create a new sink writing to `{final_path}.tmp`
    pub fn new(final_path: &Path, schema: &Arc<Schema>, zstd_level: i32) -> io::Result<Self> {
        let mut tmp_name = final_path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        // Clean up stale tmp file
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }
        if let Some(parent) = final_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(&tmp_path)?;
        let level = ZstdLevel::try_new(zstd_level)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(level))
            .set_max_row_group_size(1024 * 1024)
            .build();

        let writer =
            ArrowWriter::try_new(file, schema.clone(), Some(props)).map_err(io::Error::other)?;

        Ok(Self {
            writer,
            tmp_path,
            final_path: final_path.to_path_buf(),
            row_count: 0,
        })
    }

    pub fn write_batch(&mut self, batch: &RecordBatch) -> io::Result<()> {
        self.row_count += batch.num_rows();
        self.writer.write(batch).map_err(io::Error::other)
    }

    /// Finalize: flush footer and atomically rename tmp → final
    pub fn finalize(self) -> io::Result<usize> {
        let row_count = self.row_count;
        self.writer.close().map_err(io::Error::other)?;
        fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(row_count)
    }
}

/// Remove stale .tmp files in a directory
pub fn cleanup_tmp_files(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "tmp") {
            log::warn!("Removing stale tmp file: {}", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn jsonl_appends_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/comments.jsonl");

        let mut sink = JsonlSink::open(&path).unwrap();
        sink.write(&Item::new("a", "v1")).unwrap();
        sink.flush().unwrap();
        drop(sink);

        let mut sink = JsonlSink::open(&path).unwrap();
        sink.write(&Item::new("b", "v1")).unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.written(), 1);

        let got = lines(&path);
        assert_eq!(got.len(), 2);
        let second: Item = serde_json::from_str(&got[1]).unwrap();
        assert_eq!(second.item_id, "b");
    }

    #[test]
    fn jsonl_open_cuts_torn_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("comments.jsonl");
        let good = serde_json::to_string(&Item::new("a", "v1")).unwrap();
        fs::write(&path, format!("{good}\n{{\"comment_id\":\"b\",\"vid")).unwrap();

        let mut sink = JsonlSink::open(&path).unwrap();
        sink.write(&Item::new("c", "v1")).unwrap();
        sink.flush().unwrap();

        let got = lines(&path);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0], good);
        assert!(got[1].contains("\"comment_id\":\"c\""));
    }

    #[test]
    fn jsonl_open_single_torn_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("comments.jsonl");
        fs::write(&path, b"{\"comment_id\":").unwrap();
        let sink = JsonlSink::open(&path).unwrap();
        drop(sink);
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn vec_sink_collects() {
        let mut sink: Vec<Item> = Vec::new();
        sink.write(&Item::new("a", "v")).unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn cleanup_tmp_files_removes_only_tmp() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.tmp"), b"stale").unwrap();
        fs::write(dir.path().join("b.rec"), b"keep").unwrap();
        fs::write(dir.path().join("c.rec.tmp"), b"stale2").unwrap();

        cleanup_tmp_files(dir.path()).unwrap();

        assert!(!dir.path().join("a.tmp").exists());
        assert!(dir.path().join("b.rec").exists());
        assert!(!dir.path().join("c.rec.tmp").exists());
    }
}
