//! JSON snapshot of the hash cache.
//!
//! ```json
//! {
//!   "version": 1,
//!   "files": {
//!     "/library/2023/June/images/a.jpg": {
//!       "size": 123456,
//!       "mod_time": "2023-06-01T10:00:00.123456789Z",
//!       "hash": "ba7816bf..."
//!     }
//!   }
//! }
//! ```
//!
//! Loading tolerates a missing file, a missing `version` field and individual
//! malformed records. Saving goes through a temp file in the same directory
//! followed by a rename, so the previous snapshot survives a crash mid-save.

use super::{ContentHash, HashCacheEntry};
use crate::error::CacheError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Deserialize)]
struct RawSnapshot {
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    files: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotRecord {
    size: u64,
    mod_time: DateTime<Utc>,
    hash: String,
}

#[derive(Serialize)]
struct SnapshotOut<'a> {
    version: u32,
    files: BTreeMap<&'a str, SnapshotRecord>,
}

/// Read a snapshot. A missing file yields an empty list.
pub fn read_snapshot(path: &Path) -> Result<Vec<(PathBuf, HashCacheEntry)>, CacheError> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(CacheError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let raw: RawSnapshot = serde_json::from_str(&data).map_err(|_| CacheError::Corrupted {
        path: path.to_path_buf(),
    })?;

    if let Some(version) = raw.version.filter(|v| *v != SNAPSHOT_VERSION) {
        debug!("Hash cache {} has version {}, reading anyway", path.display(), version);
    }

    let entries = raw
        .files
        .into_iter()
        .filter_map(|(file, value)| match decode_record(value) {
            Some(entry) => Some((PathBuf::from(file), entry)),
            None => {
                debug!("Skipping malformed hash cache record for {}", file);
                None
            }
        })
        .collect();

    Ok(entries)
}

fn decode_record(value: Value) -> Option<HashCacheEntry> {
    let record: SnapshotRecord = serde_json::from_value(value).ok()?;
    Some(HashCacheEntry {
        size: record.size,
        modified: record.mod_time.into(),
        hash: ContentHash::from_hex(&record.hash)?,
    })
}

/// Write a snapshot atomically. Returns the number of records written.
pub fn write_snapshot<'a, I>(path: &Path, entries: I) -> Result<usize, CacheError>
where
    I: IntoIterator<Item = (&'a Path, HashCacheEntry)>,
{
    let mut files = BTreeMap::new();
    for (file, entry) in entries {
        let Some(key) = file.to_str() else {
            debug!("Not persisting non UTF-8 path {}", file.display());
            continue;
        };
        files.insert(
            key,
            SnapshotRecord {
                size: entry.size,
                mod_time: entry.modified.into(),
                hash: entry.hash.to_hex(),
            },
        );
    }
    let written = files.len();

    let data = serde_json::to_vec_pretty(&SnapshotOut {
        version: SNAPSHOT_VERSION,
        files,
    })
    .map_err(|e| CacheError::SerializationFailed(e.to_string()))?;

    let write_error = |source: std::io::Error| CacheError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(write_error)?;

    let mut temp = NamedTempFile::new_in(dir).map_err(write_error)?;
    temp.write_all(&data).map_err(write_error)?;
    temp.as_file().sync_all().map_err(write_error)?;
    temp.persist(path).map_err(|e| write_error(e.error))?;

    Ok(written)
}
