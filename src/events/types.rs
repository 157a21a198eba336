//! Event type definitions for progress reporting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted by the sorting pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Destination indexing events
    Index(IndexEvent),
    /// Source walk events
    Walk(WalkEvent),
    /// Placement events
    Move(MoveEvent),
    /// Pipeline-level events
    Pipeline(PipelineEvent),
}

/// Events while hashing the files already present at the destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IndexEvent {
    /// Indexing has started
    Started { root: PathBuf },
    /// Progress update during indexing
    Progress(IndexProgress),
    /// Indexing completed
    Completed { indexed: usize },
}

/// Progress information during indexing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexProgress {
    /// Files hashed so far
    pub hashed: usize,
    /// File that was just hashed
    pub current_path: PathBuf,
}

/// Events from the source walker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalkEvent {
    /// A record was queued for placement
    FileQueued { path: PathBuf },
    /// A duplicate was handled in place (skipped or deleted)
    DuplicateHandled { path: PathBuf, action: String },
    /// Walking completed
    Completed { queued: usize },
}

/// Events from the movers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MoveEvent {
    /// A file reached its destination
    Placed { from: PathBuf, to: PathBuf },
    /// A file could not be placed
    Failed { path: PathBuf, message: String },
}

/// Pipeline-level events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// Pipeline has started
    Started,
    /// Moving to a new phase
    PhaseChanged { phase: PipelinePhase },
    /// Pipeline completed
    Completed { processed: usize, duration_ms: u64 },
}

/// Phases of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelinePhase {
    Indexing,
    Organizing,
    Saving,
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelinePhase::Indexing => write!(f, "Indexing destination"),
            PipelinePhase::Organizing => write!(f, "Organizing"),
            PipelinePhase::Saving => write!(f, "Saving cache"),
        }
    }
}
