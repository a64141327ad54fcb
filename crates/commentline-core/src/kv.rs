//! Durable key-value storage backing the checkpoint store
//!
//! [`FileKv`] keeps one file per key. Writes go to `{file}.tmp`, are fsynced
//! and renamed over the target, so a crash leaves either the old or the new
//! value. Each file carries a blake3 digest of its payload; a torn or
//! hand-edited file is reported as [`KvError::Corrupt`].

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::sink::cleanup_tmp_files;

/// File extension for committed records
const RECORD_EXT: &str = "rec";

/// Header prefix preceding the payload digest
const DIGEST_PREFIX: &[u8] = b"blake3:";

#[derive(Debug)]
pub enum KvError {
    Io(std::io::Error),
    Corrupt { key: String, reason: String },
}

impl std::fmt::Display for KvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO: {e}"),
            Self::Corrupt { key, reason } => write!(f, "corrupt record {key}: {reason}"),
        }
    }
}

impl std::error::Error for KvError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Corrupt { .. } => None,
        }
    }
}

impl From<std::io::Error> for KvError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Byte store with atomic-replace writes.
pub trait DurableKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    /// Replace the value for `key`; either fully visible afterwards or not at all
    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), KvError>;

    /// All keys starting with `prefix`, sorted
    fn keys(&self, prefix: &str) -> Result<Vec<String>, KvError>;
}

/// In-memory store (tests and embedding)
#[derive(Debug, Default, Clone)]
pub struct MemoryKv {
    map: BTreeMap<String, Vec<u8>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableKv for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.map.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), KvError> {
        self.map.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        Ok(self
            .map
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Directory-backed store, one file per key
#[derive(Debug)]
pub struct FileKv {
    dir: PathBuf,
}

impl FileKv {
    /// Open (creating if needed) and drop stale `.tmp` files from interrupted writes
    pub fn open(dir: &Path) -> Result<Self, KvError> {
        fs::create_dir_all(dir)?;
        cleanup_tmp_files(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{RECORD_EXT}", encode_key(key)))
    }
}

impl DurableKv for FileKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let path = self.path_for(key);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        decode_record(key, &raw).map(Some)
    }

    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), KvError> {
        let final_path = self.path_for(key);
        let mut tmp_name = final_path.clone().into_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&encode_record(value))?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &final_path)?;
        // Persist the rename itself; directories cannot be opened for sync on every platform
        if let Ok(dir) = File::open(&self.dir) {
            let _ = dir.sync_all();
        }
        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        let pattern = self.dir.join(format!("*.{RECORD_EXT}"));
        let pattern_str = pattern.to_string_lossy();

        let mut keys = Vec::new();
        for entry in glob::glob(&pattern_str).map_err(|e| {
            KvError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })? {
            let path = match entry {
                Ok(p) => p,
                Err(e) => {
                    log::warn!("Skipping unreadable checkpoint entry: {e}");
                    continue;
                }
            };
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match decode_key(stem) {
                Some(key) if key.starts_with(prefix) => keys.push(key),
                Some(_) => {}
                None => log::warn!("Ignoring foreign file in store: {}", path.display()),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn encode_record(value: &[u8]) -> Vec<u8> {
    let digest = blake3::hash(value);
    let mut out = Vec::with_capacity(DIGEST_PREFIX.len() + 65 + value.len());
    out.extend_from_slice(DIGEST_PREFIX);
    out.extend_from_slice(digest.to_hex().as_bytes());
    out.push(b'\n');
    out.extend_from_slice(value);
    out
}

fn decode_record(key: &str, raw: &[u8]) -> Result<Vec<u8>, KvError> {
    let corrupt = |reason: &str| KvError::Corrupt {
        key: key.to_string(),
        reason: reason.to_string(),
    };
    let newline = raw
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| corrupt("missing header"))?;
    let header = raw[..newline]
        .strip_prefix(DIGEST_PREFIX)
        .ok_or_else(|| corrupt("missing digest"))?;
    let expected = std::str::from_utf8(header)
        .ok()
        .and_then(|hex| blake3::Hash::from_hex(hex).ok())
        .ok_or_else(|| corrupt("invalid digest"))?;
    let payload = &raw[newline + 1..];
    if blake3::hash(payload) != expected {
        return Err(corrupt("digest mismatch"));
    }
    Ok(payload.to_vec())
}

/// Percent-encode everything outside `[A-Za-z0-9_-]` so any key maps to a safe filename
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

fn decode_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = std::str::from_utf8(bytes.get(i + 1..i + 3)?).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
