//! # Pipeline Module
//!
//! Orchestrates a complete sorting run.
//!
//! ## Pipeline Stages
//! 1. **Validate** - Check paths and settings; nothing is touched on failure
//! 2. **Index** - Load the hash cache snapshot and hash the destination tree
//! 3. **Organize** - Walker workers feed a bounded queue drained by movers
//! 4. **Save** - Prune and persist the hash cache
//!
//! ## Errors
//! Only configuration problems abort a run. Everything that goes wrong with
//! a single file is routed through the [`IssueSink`] and shows up in the
//! final [`IssueReport`].

mod executor;
mod sink;

pub use executor::{
    default_workers, Pipeline, PipelineBuilder, PipelineConfig, PipelineResult, RunSummary,
    ValidatedPaths, DEFAULT_QUEUE_CAPACITY,
};
pub use sink::{Issue, IssueLogger, IssueReport, IssueSink, DEFAULT_SINK_CAPACITY};
