//! # Core Module
//!
//! The front-end agnostic sorting engine.
//!
//! ## Modules
//! - `classify` - Decides what kind of file a path is
//! - `metadata` - Reads capture time and GPS position
//! - `geo` - Resolves coordinates to a country
//! - `cache` - Reuses content hashes while files are unchanged
//! - `duplicate` - Detects content already present at the destination
//! - `destination` - Computes collision-free destination paths
//! - `walker` - Produces records from the source tree
//! - `mover` - Places records at the destination
//! - `pipeline` - Orchestrates the full workflow

pub mod cache;
pub mod classify;
pub mod destination;
pub mod duplicate;
pub mod geo;
pub mod metadata;
pub mod mover;
pub mod pipeline;
pub mod walker;

// Re-export commonly used types
pub use cache::{ContentHash, HashCache};
pub use classify::FileCategory;
pub use destination::{MonthFormat, OrganizeMode};
pub use duplicate::DuplicateStrategy;
pub use geo::{Coordinates, CountryFeature};
pub use metadata::MetadataReader;
pub use pipeline::{Pipeline, PipelineConfig, PipelineResult, RunSummary};
pub use walker::FileRecord;
