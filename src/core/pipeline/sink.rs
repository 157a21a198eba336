//! Issue sink: the single error channel of a run.
//!
//! Walker and mover workers push per-file errors and warnings into a bounded
//! crossbeam channel. One logging thread drains it, writes every issue to
//! `tracing` and hands back an [`IssueReport`] once all senders are gone.

use crate::error::MediaSorterError;
use crossbeam_channel::{bounded, Sender};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use tracing::{error, warn};

/// Default number of issues that may wait for the logger
pub const DEFAULT_SINK_CAPACITY: usize = 256;

/// A per-file problem that did not stop the run
#[derive(Debug)]
pub enum Issue {
    Error(MediaSorterError),
    Warning { path: PathBuf, message: String },
}

/// Handle for reporting issues. Cheap to clone.
#[derive(Clone)]
pub struct IssueSink {
    sender: Sender<Issue>,
}

impl IssueSink {
    /// Start the logging thread and return the sink feeding it
    pub fn spawn(capacity: usize) -> (IssueSink, IssueLogger) {
        let (sender, receiver) = bounded::<Issue>(capacity.max(1));

        let handle = thread::spawn(move || {
            let mut report = IssueReport::default();
            for issue in receiver.iter() {
                match issue {
                    Issue::Error(e) => {
                        error!("{}", e);
                        report.errors.push(e.to_string());
                    }
                    Issue::Warning { path, message } => {
                        warn!("{}: {}", path.display(), message);
                        report
                            .warnings
                            .push(format!("{}: {}", path.display(), message));
                    }
                }
            }
            report
        });

        (IssueSink { sender }, IssueLogger { handle })
    }

    /// A sink whose issues go nowhere
    pub fn detached() -> IssueSink {
        let (sender, _receiver) = bounded(1);
        IssueSink { sender }
    }

    /// Report a per-file error. Never fails the caller.
    pub fn error(&self, err: impl Into<MediaSorterError>) {
        let _ = self.sender.send(Issue::Error(err.into()));
    }

    /// Report a warning about `path`. Never fails the caller.
    pub fn warning(&self, path: &Path, message: impl Into<String>) {
        let _ = self.sender.send(Issue::Warning {
            path: path.to_path_buf(),
            message: message.into(),
        });
    }
}

/// The logging side of an [`IssueSink`]
pub struct IssueLogger {
    handle: JoinHandle<IssueReport>,
}

impl IssueLogger {
    /// Wait for every sink clone to be dropped and collect the report
    pub fn finish(self) -> IssueReport {
        match self.handle.join() {
            Ok(report) => report,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Everything the logger saw during a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct IssueReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl IssueReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HashError, MoveError};

    #[test]
    fn logger_collects_from_all_clones() {
        let (sink, logger) = IssueSink::spawn(4);

        let workers: Vec<_> = (0..4)
            .map(|i| {
                let sink = sink.clone();
                thread::spawn(move || {
                    sink.warning(Path::new(&format!("/src/{i}.jpg")), "no GPS data");
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        sink.error(HashError::IoError {
            path: PathBuf::from("/src/broken.jpg"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "boom"),
        });
        drop(sink);

        let report = logger.finish();
        assert_eq!(report.warnings.len(), 4);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("/src/broken.jpg"));
    }

    #[test]
    fn errors_keep_both_paths() {
        let (sink, logger) = IssueSink::spawn(1);
        sink.error(MoveError::Rename {
            from: PathBuf::from("/src/a.jpg"),
            to: PathBuf::from("/lib/a.jpg"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        });
        drop(sink);

        let report = logger.finish();
        assert!(report.errors[0].contains("/src/a.jpg"));
        assert!(report.errors[0].contains("/lib/a.jpg"));
    }

    #[test]
    fn detached_sink_swallows_issues() {
        let sink = IssueSink::detached();
        sink.warning(Path::new("/src/a.jpg"), "ignored");
        sink.error(HashError::IoError {
            path: PathBuf::from("/src/a.jpg"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "ignored"),
        });
    }

    #[test]
    fn empty_report_is_clean() {
        let (sink, logger) = IssueSink::spawn(1);
        drop(sink);
        assert!(logger.finish().is_clean());
    }
}
