//! # Duplicate Module
//!
//! Decides whether a file's content is already present at (or on its way
//! to) the destination, and what to do about it.
//!
//! ## Index
//! [`DestinationIndex`] maps content hashes to the path of the first copy
//! seen: either a file already under the destination root, or the slot
//! reserved for the first accepted source file. It is filled once up
//! front from the destination tree and then grows as the walker accepts new
//! files, so duplicates within a single run are caught too (first seen wins).
//!
//! ## Strategies
//! - `move` - place the duplicate in `<original stem>_duplicates/` next to
//!   the original
//! - `skip` - leave the source untouched
//! - `delete` - remove the source

use crate::core::cache::{ContentHash, HashCache};
use crate::error::{ConfigError, HashError};
use crate::events::{Event, EventSender, IndexEvent, IndexProgress};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Suffix appended to the original's stem to name its duplicates folder
pub const DUPLICATES_SUFFIX: &str = "_duplicates";

/// What to do with a file whose content already exists at the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateStrategy {
    #[default]
    Move,
    Skip,
    Delete,
}

impl FromStr for DuplicateStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "move" => Ok(DuplicateStrategy::Move),
            "skip" => Ok(DuplicateStrategy::Skip),
            "delete" => Ok(DuplicateStrategy::Delete),
            _ => Err(ConfigError::InvalidStrategy {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for DuplicateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicateStrategy::Move => write!(f, "move"),
            DuplicateStrategy::Skip => write!(f, "skip"),
            DuplicateStrategy::Delete => write!(f, "delete"),
        }
    }
}

/// Outcome of a duplicate check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateCheck {
    /// Content not seen before; this file now owns the hash
    Unique,
    /// Content already owned by `original`
    Duplicate { original: PathBuf },
}

impl DuplicateCheck {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DuplicateCheck::Duplicate { .. })
    }
}

/// Outcome of [`DestinationIndex::claim_with`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotClaim {
    /// This file owns the hash and will be placed at the given path
    Reserved(PathBuf),
    Duplicate { original: PathBuf },
}

/// Content hash -> path of the first copy seen
#[derive(Debug, Default)]
pub struct DestinationIndex {
    seen: DashMap<ContentHash, PathBuf>,
}

impl DestinationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash every regular file under `root` into a fresh index.
    ///
    /// Files that cannot be hashed are logged and left out. Returns the
    /// index together with the number of files that failed.
    pub fn build(root: &Path, cache: &HashCache, events: &EventSender) -> (Self, usize) {
        events.send(Event::Index(IndexEvent::Started {
            root: root.to_path_buf(),
        }));

        let files: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable destination entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();

        let index = Self::new();
        let hashed = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        files.par_iter().for_each(|path| match cache.get_or_compute(path) {
            Ok(hash) => {
                index.claim(hash, path);
                let done = hashed.fetch_add(1, Ordering::Relaxed) + 1;
                events.send(Event::Index(IndexEvent::Progress(IndexProgress {
                    hashed: done,
                    current_path: path.clone(),
                })));
            }
            Err(e) => {
                failed.fetch_add(1, Ordering::Relaxed);
                warn!("Could not index destination file: {}", e);
            }
        });

        debug!("Indexed {} destination files under {}", index.len(), root.display());
        events.send(Event::Index(IndexEvent::Completed {
            indexed: hashed.load(Ordering::Relaxed),
        }));

        (index, failed.into_inner())
    }

    /// Atomically record `path` as the owner of `hash` unless someone already
    /// owns it.
    pub fn claim(&self, hash: ContentHash, path: &Path) -> DuplicateCheck {
        match self.seen.entry(hash) {
            Entry::Occupied(owner) => DuplicateCheck::Duplicate {
                original: owner.get().clone(),
            },
            Entry::Vacant(slot) => {
                slot.insert(path.to_path_buf());
                DuplicateCheck::Unique
            }
        }
    }

    /// Like [`claim`](Self::claim), but the owner's path comes from
    /// `reserve`, which runs while the entry is locked. Nobody can see the
    /// hash as owned before its final path is known.
    pub fn claim_with<E>(
        &self,
        hash: ContentHash,
        reserve: impl FnOnce() -> Result<PathBuf, E>,
    ) -> Result<SlotClaim, E> {
        match self.seen.entry(hash) {
            Entry::Occupied(owner) => Ok(SlotClaim::Duplicate {
                original: owner.get().clone(),
            }),
            Entry::Vacant(vacant) => {
                let slot = reserve()?;
                vacant.insert(slot.clone());
                Ok(SlotClaim::Reserved(slot))
            }
        }
    }

    /// Current owner of `hash`, if any
    pub fn owner_of(&self, hash: &ContentHash) -> Option<PathBuf> {
        self.seen.get(hash).map(|owner| owner.clone())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Duplicate checks backed by the shared hash cache
pub struct DuplicateResolver<'a> {
    cache: &'a HashCache,
    index: &'a DestinationIndex,
}

impl<'a> DuplicateResolver<'a> {
    pub fn new(cache: &'a HashCache, index: &'a DestinationIndex) -> Self {
        Self { cache, index }
    }

    /// Hash `path` and look it up without claiming.
    pub fn lookup(&self, path: &Path) -> Result<(ContentHash, Option<PathBuf>), HashError> {
        let hash = self.cache.get_or_compute(path)?;
        Ok((hash, self.index.owner_of(&hash)))
    }

    /// Whether `path`'s content is already known. Unique content is claimed
    /// for `intended_destination`.
    pub fn is_duplicate(&self, path: &Path, intended_destination: &Path) -> Result<bool, HashError> {
        let hash = self.cache.get_or_compute(path)?;
        Ok(self.index.claim(hash, intended_destination).is_duplicate())
    }

    /// Claim a hash computed earlier by [`lookup`](Self::lookup).
    pub fn claim(&self, hash: ContentHash, intended_destination: &Path) -> DuplicateCheck {
        self.index.claim(hash, intended_destination)
    }

    /// Claim a hash and reserve its owner's slot in one step
    pub fn claim_slot<E>(
        &self,
        hash: ContentHash,
        reserve: impl FnOnce() -> Result<PathBuf, E>,
    ) -> Result<SlotClaim, E> {
        self.index.claim_with(hash, reserve)
    }
}

/// Folder that collects duplicates of `original`:
/// `<dir of original>/<original stem>_duplicates`
pub fn duplicates_folder(original: &Path) -> PathBuf {
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let parent = original.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("{}{}", stem, DUPLICATES_SUFFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::null_sender;
    use tempfile::TempDir;

    #[test]
    fn strategy_parses_case_insensitively() {
        assert_eq!("move".parse::<DuplicateStrategy>().unwrap(), DuplicateStrategy::Move);
        assert_eq!("SKIP".parse::<DuplicateStrategy>().unwrap(), DuplicateStrategy::Skip);
        assert_eq!(" delete ".parse::<DuplicateStrategy>().unwrap(), DuplicateStrategy::Delete);
    }

    #[test]
    fn unknown_strategy_is_config_error() {
        let err = "archive".parse::<DuplicateStrategy>().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidStrategy { .. }));
    }

    #[test]
    fn first_claim_wins() {
        let index = DestinationIndex::new();
        let hash = ContentHash::from_bytes([1; 32]);

        assert_eq!(index.claim(hash, Path::new("/lib/a.jpg")), DuplicateCheck::Unique);
        assert_eq!(
            index.claim(hash, Path::new("/lib/b.jpg")),
            DuplicateCheck::Duplicate {
                original: PathBuf::from("/lib/a.jpg")
            }
        );
        assert_eq!(index.owner_of(&hash), Some(PathBuf::from("/lib/a.jpg")));
    }

    #[test]
    fn concurrent_claims_have_one_winner() {
        let index = std::sync::Arc::new(DestinationIndex::new());
        let hash = ContentHash::from_bytes([2; 32]);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let index = std::sync::Arc::clone(&index);
                std::thread::spawn(move || {
                    index.claim(hash, Path::new(&format!("/lib/{i}.jpg")))
                })
            })
            .collect();

        let unique = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|check| !check.is_duplicate())
            .count();
        assert_eq!(unique, 1);
    }

    #[test]
    fn claim_with_records_the_reserved_slot() {
        let index = DestinationIndex::new();
        let hash = ContentHash::from_bytes([3; 32]);

        let first = index.claim_with(hash, || Ok::<_, ()>(PathBuf::from("/lib/a_1.jpg")));
        assert_eq!(first, Ok(SlotClaim::Reserved(PathBuf::from("/lib/a_1.jpg"))));

        let second = index.claim_with(hash, || -> Result<PathBuf, ()> {
            panic!("owner already known, nothing to reserve")
        });
        assert_eq!(
            second,
            Ok(SlotClaim::Duplicate {
                original: PathBuf::from("/lib/a_1.jpg")
            })
        );
    }

    #[test]
    fn failed_reservation_leaves_hash_unclaimed() {
        let index = DestinationIndex::new();
        let hash = ContentHash::from_bytes([4; 32]);

        assert_eq!(index.claim_with(hash, || Err("disk full")), Err("disk full"));
        assert!(index.owner_of(&hash).is_none());
    }

    #[test]
    fn build_indexes_existing_destination_files() {
        let dest = TempDir::new().unwrap();
        std::fs::create_dir_all(dest.path().join("2023/June/images")).unwrap();
        let existing = dest.path().join("2023/June/images/a.jpg");
        std::fs::write(&existing, b"same bytes").unwrap();

        let cache = HashCache::new();
        let (index, failed) = DestinationIndex::build(dest.path(), &cache, &null_sender());

        assert_eq!(failed, 0);
        assert_eq!(index.len(), 1);

        let source = TempDir::new().unwrap();
        let incoming = source.path().join("b.jpg");
        std::fs::write(&incoming, b"same bytes").unwrap();

        let resolver = DuplicateResolver::new(&cache, &index);
        assert!(resolver
            .is_duplicate(&incoming, &dest.path().join("b.jpg"))
            .unwrap());
        assert_eq!(resolver.lookup(&incoming).unwrap().1, Some(existing));
    }

    #[test]
    fn identical_sources_in_one_run_are_caught() {
        let source = TempDir::new().unwrap();
        let a = source.path().join("a.jpg");
        let b = source.path().join("b.jpg");
        std::fs::write(&a, b"twin").unwrap();
        std::fs::write(&b, b"twin").unwrap();

        let cache = HashCache::new();
        let index = DestinationIndex::new();
        let resolver = DuplicateResolver::new(&cache, &index);

        assert!(!resolver.is_duplicate(&a, Path::new("/lib/a.jpg")).unwrap());
        assert!(resolver.is_duplicate(&b, Path::new("/lib/b.jpg")).unwrap());
    }

    #[test]
    fn duplicates_folder_sits_next_to_original() {
        assert_eq!(
            duplicates_folder(Path::new("/lib/2023/June/images/a.jpg")),
            PathBuf::from("/lib/2023/June/images/a_duplicates")
        );
    }
}
