//! # Cache Module
//!
//! Content hashes keyed by path, reused while a file is unchanged.
//!
//! ## Staleness
//! An entry is valid only while the file's size and modification time
//! (full precision) match what was recorded when it was hashed. Any
//! mismatch forces a full re-hash and overwrites the entry.
//!
//! ## Concurrency
//! [`HashCache::get_or_compute`] may be called from any number of worker
//! threads at once; the map is a sharded `DashMap`. Persisting and pruning
//! iterate the map and must only run once the workers have been joined.
//!
//! ## Persistence
//! A JSON snapshot is loaded at start-up and written back at the end of a
//! run, see [`snapshot`].

mod hasher;
pub mod snapshot;

pub use hasher::{ContentHasher, Sha256Hasher, MMAP_THRESHOLD};

use crate::error::{CacheError, HashError};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{digest::Output, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;
use tracing::trace;

/// A SHA-256 content digest
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub(crate) fn from_digest(digest: Output<Sha256>) -> Self {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Parse a 64 character hex string
    pub fn from_hex(s: &str) -> Option<Self> {
        let decoded = hex::decode(s).ok()?;
        let bytes: [u8; 32] = decoded.try_into().ok()?;
        Some(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

/// A cached hash entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashCacheEntry {
    /// File size at time of hashing
    pub size: u64,
    /// File modification time at time of hashing
    pub modified: SystemTime,
    /// The computed digest
    pub hash: ContentHash,
}

impl HashCacheEntry {
    /// Check if this entry is still valid for a file
    pub fn is_valid_for(&self, size: u64, modified: SystemTime) -> bool {
        self.size == size && self.modified == modified
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries currently held
    pub entries: usize,
    /// Lookups answered without reading the file
    pub hits: usize,
    /// Lookups that hashed the file
    pub misses: usize,
}

/// Concurrent, staleness-checked content hash cache
pub struct HashCache {
    entries: DashMap<PathBuf, HashCacheEntry>,
    hasher: Box<dyn ContentHasher>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl HashCache {
    /// Create an empty cache using SHA-256
    pub fn new() -> Self {
        Self::with_hasher(Box::new(Sha256Hasher::new()))
    }

    /// Create an empty cache with a custom hasher
    pub fn with_hasher(hasher: Box<dyn ContentHasher>) -> Self {
        Self {
            entries: DashMap::new(),
            hasher,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Return the content hash of `path`, hashing it only if no valid entry
    /// exists.
    pub fn get_or_compute(&self, path: &Path) -> Result<ContentHash, HashError> {
        let metadata = std::fs::metadata(path).map_err(|e| HashError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let size = metadata.len();
        let modified = metadata.modified().map_err(|e| HashError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let cached = self
            .entries
            .get(path)
            .filter(|entry| entry.is_valid_for(size, modified))
            .map(|entry| entry.hash);

        if let Some(hash) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!("Hash cache hit for {}", path.display());
            return Ok(hash);
        }

        let hash = self.hasher.hash_file(path)?;
        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!("Hashed {}", path.display());

        self.entries.insert(
            path.to_path_buf(),
            HashCacheEntry {
                size,
                modified,
                hash,
            },
        );

        Ok(hash)
    }

    /// Raw entry lookup without a staleness check
    pub fn get(&self, path: &Path) -> Option<HashCacheEntry> {
        self.entries.get(path).map(|entry| entry.clone())
    }

    /// Store an entry, replacing any previous one for the path
    pub fn insert(&self, path: PathBuf, entry: HashCacheEntry) {
        self.entries.insert(path, entry);
    }

    /// Re-key the entry for a file that was renamed. A rename keeps size and
    /// modification time, so the entry stays valid at the new path.
    pub fn relocate(&self, from: &Path, to: &Path) {
        if let Some((_, entry)) = self.entries.remove(from) {
            self.entries.insert(to.to_path_buf(), entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Merge a snapshot from disk into this cache.
    ///
    /// Returns the number of entries loaded. A missing snapshot loads nothing.
    pub fn load_snapshot(&self, path: &Path) -> Result<usize, CacheError> {
        let entries = snapshot::read_snapshot(path)?;
        let loaded = entries.len();
        for (file, entry) in entries {
            self.entries.insert(file, entry);
        }
        Ok(loaded)
    }

    /// Write every entry to a snapshot on disk.
    ///
    /// Must not race with `get_or_compute` callers.
    pub fn save_snapshot(&self, path: &Path) -> Result<usize, CacheError> {
        let entries: Vec<(PathBuf, HashCacheEntry)> = self
            .entries
            .iter()
            .map(|item| (item.key().clone(), item.value().clone()))
            .collect();

        snapshot::write_snapshot(
            path,
            entries.iter().map(|(file, entry)| (file.as_path(), entry.clone())),
        )
    }

    /// Drop entries whose file no longer exists. Returns the number removed.
    ///
    /// Must not race with `get_or_compute` callers.
    pub fn prune_missing(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|path, _| path.exists());
        before - self.entries.len()
    }
}

impl Default for HashCache {
    fn default() -> Self {
        Self::new()
    }
}
