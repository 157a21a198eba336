//! # Walker Module
//!
//! Producer side of the pipeline.
//!
//! One thread walks the source tree in file-name order and feeds paths into
//! a small bounded work channel. A fixed pool of workers classifies each
//! file, hashes it through the shared cache, checks it against the
//! destination index, reads its metadata and sends a [`FileRecord`] to the
//! output channel.
//!
//! Duplicates under the `skip` and `delete` strategies are dealt with here
//! and never reach the movers. The first copy of any content gets its
//! destination slot reserved while its hash is claimed, so later duplicates
//! know the name it will really have.
//!
//! The output sender is owned by [`Walker::run`]; every worker clone is
//! dropped when its thread is joined, so the channel closes only after the
//! last worker has finished writing.

use crate::core::classify::{Classifier, FileCategory};
use crate::core::destination::{release_path, reserve_path, DestinationResolver, OrganizeMode};
use crate::core::duplicate::{DuplicateResolver, DuplicateStrategy, SlotClaim};
use crate::core::geo::CountryResolver;
use crate::core::metadata::MetadataReader;
use crate::core::pipeline::IssueSink;
use crate::error::ScanError;
use crate::events::{Event, EventSender, WalkEvent};
use chrono::{DateTime, Local, NaiveDateTime};
use crossbeam_channel::{bounded, Sender};
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tracing::{debug, info};
use walkdir::WalkDir;

/// One file observed by the walker, consumed once by a mover
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute source path
    pub path: PathBuf,
    pub category: FileCategory,
    /// Capture time from metadata, or the modification time
    pub created_at: NaiveDateTime,
    /// False when `created_at` came from the filesystem
    pub has_reliable_timestamp: bool,
    /// Resolved country, empty when unknown or not in geo mode
    pub country: String,
    pub is_duplicate: bool,
    /// Where the first copy of this content lives (or will live)
    pub duplicate_of: Option<PathBuf>,
    /// Placeholder claimed at the destination for the first copy of its
    /// content; the mover renames the file over it
    pub reserved: Option<PathBuf>,
}

/// Run-time settings for the walker
#[derive(Debug, Clone)]
pub struct WalkSettings {
    pub source: PathBuf,
    pub strategy: DuplicateStrategy,
    pub move_unknown: bool,
    pub workers: usize,
}

/// Shared services the walker workers query
pub struct WalkServices<'a> {
    pub metadata: &'a dyn MetadataReader,
    pub countries: &'a dyn CountryResolver,
    pub duplicates: DuplicateResolver<'a>,
    pub destinations: &'a DestinationResolver,
}

/// Counters for one walk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WalkStats {
    /// Regular files found under the source root
    pub discovered: usize,
    /// Records handed to the movers
    pub queued: usize,
    /// Files rejected by the extension allow-list
    pub excluded: usize,
    /// Unknown files left alone because unknown handling is off
    pub unknown_dropped: usize,
    pub duplicates_skipped: usize,
    pub duplicates_deleted: usize,
    /// Files abandoned after an error
    pub failed: usize,
}

#[derive(Default)]
struct WalkCounters {
    discovered: AtomicUsize,
    queued: AtomicUsize,
    excluded: AtomicUsize,
    unknown_dropped: AtomicUsize,
    duplicates_skipped: AtomicUsize,
    duplicates_deleted: AtomicUsize,
    failed: AtomicUsize,
}

impl WalkCounters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> WalkStats {
        WalkStats {
            discovered: self.discovered.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            excluded: self.excluded.load(Ordering::Relaxed),
            unknown_dropped: self.unknown_dropped.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            duplicates_deleted: self.duplicates_deleted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Source tree producer
pub struct Walker<'a> {
    settings: WalkSettings,
    classifier: Classifier,
    services: WalkServices<'a>,
    issues: IssueSink,
    events: EventSender,
}

impl<'a> Walker<'a> {
    pub fn new(
        settings: WalkSettings,
        classifier: Classifier,
        services: WalkServices<'a>,
        issues: IssueSink,
        events: EventSender,
    ) -> Self {
        Self {
            settings,
            classifier,
            services,
            issues,
            events,
        }
    }

    /// Walk the source tree, sending records to `output`.
    ///
    /// Returns once traversal is complete and every worker has exited;
    /// `output` is dropped at that point.
    pub fn run(&self, output: Sender<FileRecord>) -> WalkStats {
        let counters = WalkCounters::default();
        let workers = self.settings.workers.max(1);
        let (work_tx, work_rx) = bounded::<PathBuf>(workers * 2);

        thread::scope(|scope| {
            for _ in 0..workers {
                let work_rx = work_rx.clone();
                let output = output.clone();
                let counters = &counters;
                scope.spawn(move || {
                    for path in work_rx.iter() {
                        self.process(&path, &output, counters);
                    }
                });
            }
            drop(work_rx);

            self.traverse(&work_tx, &counters);
            drop(work_tx);
        });
        drop(output);

        let stats = counters.snapshot();
        self.events.send(Event::Walk(WalkEvent::Completed {
            queued: stats.queued,
        }));
        stats
    }

    fn traverse(&self, work: &Sender<PathBuf>, counters: &WalkCounters) {
        let walker = WalkDir::new(&self.settings.source).sort_by_file_name();

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    WalkCounters::bump(&counters.discovered);
                    if work.send(entry.into_path()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    WalkCounters::bump(&counters.failed);
                    self.issues.error(scan_error(e));
                }
            }
        }
    }

    fn process(&self, path: &Path, output: &Sender<FileRecord>, counters: &WalkCounters) {
        let category = self.classifier.classify(path);
        match category {
            FileCategory::Excluded | FileCategory::Folder => {
                debug!("Excluded {}", path.display());
                WalkCounters::bump(&counters.excluded);
                return;
            }
            FileCategory::Unknown if !self.settings.move_unknown => {
                debug!("Leaving unknown file {}", path.display());
                WalkCounters::bump(&counters.unknown_dropped);
                return;
            }
            _ => {}
        }

        let (hash, owner) = match self.services.duplicates.lookup(path) {
            Ok(found) => found,
            Err(e) => {
                WalkCounters::bump(&counters.failed);
                self.issues.error(e);
                return;
            }
        };

        if let Some(ref original) = owner {
            if self.handle_in_place(path, original, counters) {
                return;
            }
        }

        let Some(mut record) = self.describe(path, category, counters) else {
            return;
        };

        match owner {
            Some(original) => {
                record.is_duplicate = true;
                record.duplicate_of = Some(original);
            }
            None => {
                let intended = match self.services.destinations.canonical_path(&record) {
                    Ok(intended) => intended,
                    Err(e) => {
                        WalkCounters::bump(&counters.failed);
                        self.issues.error(e);
                        return;
                    }
                };

                // Another worker may have claimed the same content since the lookup.
                match self
                    .services
                    .duplicates
                    .claim_slot(hash, || reserve_path(&intended))
                {
                    Ok(SlotClaim::Reserved(slot)) => record.reserved = Some(slot),
                    Ok(SlotClaim::Duplicate { original }) => {
                        if self.handle_in_place(path, &original, counters) {
                            return;
                        }
                        record.is_duplicate = true;
                        record.duplicate_of = Some(original);
                    }
                    Err(e) => {
                        WalkCounters::bump(&counters.failed);
                        self.issues.error(e);
                        return;
                    }
                }
            }
        }

        debug!(
            "Queued {} ({:?}, duplicate: {})",
            record.path.display(),
            record.category,
            record.is_duplicate
        );
        self.events.send(Event::Walk(WalkEvent::FileQueued {
            path: record.path.clone(),
        }));
        match output.send(record) {
            Ok(()) => WalkCounters::bump(&counters.queued),
            Err(unsent) => {
                if let Some(ref slot) = unsent.0.reserved {
                    release_path(slot);
                }
            }
        }
    }

    /// Apply `skip`/`delete` to a duplicate. Returns false under `move`,
    /// where the duplicate continues to the movers.
    fn handle_in_place(&self, path: &Path, original: &Path, counters: &WalkCounters) -> bool {
        match self.settings.strategy {
            DuplicateStrategy::Move => false,
            DuplicateStrategy::Skip => {
                info!(
                    "Skipping duplicate {} (same content as {})",
                    path.display(),
                    original.display()
                );
                WalkCounters::bump(&counters.duplicates_skipped);
                self.events.send(Event::Walk(WalkEvent::DuplicateHandled {
                    path: path.to_path_buf(),
                    action: "skipped".to_string(),
                }));
                true
            }
            DuplicateStrategy::Delete => {
                match fs::remove_file(path) {
                    Ok(()) => {
                        info!(
                            "Deleted duplicate {} (same content as {})",
                            path.display(),
                            original.display()
                        );
                        WalkCounters::bump(&counters.duplicates_deleted);
                        self.events.send(Event::Walk(WalkEvent::DuplicateHandled {
                            path: path.to_path_buf(),
                            action: "deleted".to_string(),
                        }));
                    }
                    Err(e) => {
                        WalkCounters::bump(&counters.failed);
                        self.issues.error(ScanError::DeleteDuplicate {
                            path: path.to_path_buf(),
                            source: e,
                        });
                    }
                }
                true
            }
        }
    }

    /// Build the record for a file that will be queued
    fn describe(
        &self,
        path: &Path,
        category: FileCategory,
        counters: &WalkCounters,
    ) -> Option<FileRecord> {
        let modified = match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                WalkCounters::bump(&counters.failed);
                self.issues.error(ScanError::ReadEntry {
                    path: path.to_path_buf(),
                    source: e,
                });
                return None;
            }
        };

        let media = category.is_media();
        let captured = if media {
            self.services.metadata.creation_time(path)
        } else {
            None
        };
        let (created_at, has_reliable_timestamp) = match captured {
            Some(captured) => (captured, true),
            None => (DateTime::<Local>::from(modified).naive_local(), false),
        };

        let country = if media && self.services.destinations.mode() == OrganizeMode::Geo {
            self.country_of(path)
        } else {
            String::new()
        };

        Some(FileRecord {
            path: path.to_path_buf(),
            category,
            created_at,
            has_reliable_timestamp,
            country,
            is_duplicate: false,
            duplicate_of: None,
            reserved: None,
        })
    }

    fn country_of(&self, path: &Path) -> String {
        let Some(position) = self.services.metadata.coordinates(path) else {
            self.issues
                .warning(path, "no GPS coordinates, placing in unknown");
            return String::new();
        };

        match self.services.countries.resolve(position) {
            Some(country) => country,
            None => {
                self.issues.warning(
                    path,
                    format!(
                        "no country contains {:.5}, {:.5}, placing in unknown",
                        position.latitude, position.longitude
                    ),
                );
                String::new()
            }
        }
    }
}

fn scan_error(err: walkdir::Error) -> ScanError {
    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
    let message = err.to_string();

    match err.into_io_error() {
        Some(io) if io.kind() == ErrorKind::PermissionDenied => ScanError::PermissionDenied { path },
        Some(io) => ScanError::ReadEntry { path, source: io },
        None => ScanError::ReadEntry {
            path,
            source: std::io::Error::new(ErrorKind::Other, message),
        },
    }
}
