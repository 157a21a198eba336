//! # Mover Module
//!
//! Consumer side of the pipeline: a fixed pool of workers drains the record
//! queue, resolves each record's destination and renames the file there.
//!
//! Every file is renamed over a placeholder reserved for it with
//! [`reserve_path`], so a mover never replaces anything it did not create.
//! Originals arrive with the placeholder the walker reserved; duplicates get
//! theirs here.
//!
//! A failed move is reported to the issue sink, its placeholder is removed
//! and the worker moves on to the next record.

use crate::core::cache::HashCache;
use crate::core::classify::FileCategory;
use crate::core::destination::{release_path, reserve_path, DestinationResolver};
use crate::core::pipeline::IssueSink;
use crate::core::walker::FileRecord;
use crate::error::MoveError;
use crate::events::{Event, EventSender, MoveEvent};
use crossbeam_channel::Receiver;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tracing::debug;

/// Counters for one drain of the queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MoveStats {
    /// Media files placed in the date/geo hierarchy
    pub moved: usize,
    pub duplicates_moved: usize,
    pub unknown_moved: usize,
    pub failed: usize,
}

impl MoveStats {
    pub fn placed(&self) -> usize {
        self.moved + self.duplicates_moved + self.unknown_moved
    }
}

#[derive(Default)]
struct MoveCounters {
    moved: AtomicUsize,
    duplicates_moved: AtomicUsize,
    unknown_moved: AtomicUsize,
    failed: AtomicUsize,
}

/// Queue consumer
pub struct Mover<'a> {
    destinations: &'a DestinationResolver,
    cache: Option<&'a HashCache>,
    workers: usize,
    issues: IssueSink,
    events: EventSender,
}

impl<'a> Mover<'a> {
    pub fn new(
        destinations: &'a DestinationResolver,
        workers: usize,
        issues: IssueSink,
        events: EventSender,
    ) -> Self {
        Self {
            destinations,
            cache: None,
            workers: workers.max(1),
            issues,
            events,
        }
    }

    /// Carry cache entries over to the moved files' new paths
    pub fn with_cache(mut self, cache: &'a HashCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Drain `input` until every sender is gone and all workers are done
    pub fn run(&self, input: Receiver<FileRecord>) -> MoveStats {
        let counters = MoveCounters::default();

        thread::scope(|scope| {
            for _ in 0..self.workers {
                let input = input.clone();
                let counters = &counters;
                scope.spawn(move || {
                    for record in input.iter() {
                        self.handle(&record, counters);
                    }
                });
            }
        });

        MoveStats {
            moved: counters.moved.into_inner(),
            duplicates_moved: counters.duplicates_moved.into_inner(),
            unknown_moved: counters.unknown_moved.into_inner(),
            failed: counters.failed.into_inner(),
        }
    }

    fn handle(&self, record: &FileRecord, counters: &MoveCounters) {
        match self.place(record) {
            Ok(to) => {
                debug!("Moved {} -> {}", record.path.display(), to.display());
                if let Some(cache) = self.cache {
                    cache.relocate(&record.path, &to);
                }
                let counter = if record.is_duplicate {
                    &counters.duplicates_moved
                } else if record.category == FileCategory::Unknown {
                    &counters.unknown_moved
                } else {
                    &counters.moved
                };
                counter.fetch_add(1, Ordering::Relaxed);
                self.events.send(Event::Move(MoveEvent::Placed {
                    from: record.path.clone(),
                    to,
                }));
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                self.events.send(Event::Move(MoveEvent::Failed {
                    path: record.path.clone(),
                    message: e.to_string(),
                }));
                self.issues.error(e);
            }
        }
    }

    /// Move one record to its destination; returns the final path
    pub fn place(&self, record: &FileRecord) -> Result<PathBuf, MoveError> {
        match record.reserved {
            Some(ref slot) => move_into(&record.path, slot),
            None => {
                let target = self.destinations.resolve(record)?;
                move_file(&record.path, &target)
            }
        }
    }
}

/// Move `from` to `target`, or to the first free `_N` variant of it.
///
/// The parent directory is created when missing. Existing files are never
/// replaced.
pub fn move_file(from: &Path, target: &Path) -> Result<PathBuf, MoveError> {
    let slot = reserve_path(target)?;
    move_into(from, &slot)
}

/// Rename `from` over the placeholder at `slot`
fn move_into(from: &Path, slot: &Path) -> Result<PathBuf, MoveError> {
    match fs::rename(from, slot) {
        Ok(()) => Ok(slot.to_path_buf()),
        Err(e) => {
            release_path(slot);
            Err(MoveError::Rename {
                from: from.to_path_buf(),
                to: slot.to_path_buf(),
                source: e,
            })
        }
    }
}
