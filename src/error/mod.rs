//! # Error Module
//!
//! Error types for the media sorter.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - every per-file error names the path(s) involved
//! - **Fatal vs. per-file** - `ConfigError` aborts before anything moves,
//!   everything else is routed to the issue sink and the run continues

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum MediaSorterError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Scanning error: {0}")]
    Scan(#[from] ScanError),

    #[error("Hashing error: {0}")]
    Hash(#[from] HashError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Geo data error: {0}")]
    Geo(#[from] GeoError),

    #[error("Move error: {0}")]
    Move(#[from] MoveError),
}

/// Fatal configuration problems, detected before the pipeline starts
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{role} path does not exist: {path}")]
    PathNotFound { role: &'static str, path: PathBuf },

    #[error("{role} path is not a directory: {path}")]
    NotADirectory { role: &'static str, path: PathBuf },

    #[error("Source and destination overlap: {source_path} / {destination}")]
    OverlappingPaths {
        source_path: PathBuf,
        destination: PathBuf,
    },

    #[error("Invalid duplicate strategy '{value}' (expected move, skip or delete)")]
    InvalidStrategy { value: String },

    #[error("Invalid month format '{value}' (expected word, number or combined)")]
    InvalidMonthFormat { value: String },

    #[error("Unsupported file type '{value}' in extension list")]
    InvalidExtension { value: String },

    #[error("Nothing to organize: both photos and videos are disabled")]
    NothingToOrganize,

    #[error("Location mode needs country polygons, but none were loaded")]
    MissingCountryData,
}

/// Errors that occur while walking a directory tree
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Permission denied accessing: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Failed to read {path}: {source}")]
    ReadEntry {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete duplicate {path}: {source}")]
    DeleteDuplicate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that occur while computing content hashes
#[derive(Error, Debug)]
pub enum HashError {
    #[error("Failed to read {path} for hashing: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that occur with the persisted hash cache
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to read hash cache {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Hash cache at {path} is not valid JSON. Delete this file and try again.")]
    Corrupted { path: PathBuf },

    #[error("Failed to write hash cache {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize hash cache: {0}")]
    SerializationFailed(String),
}

/// Errors that occur while loading country polygons
#[derive(Error, Debug)]
pub enum GeoError {
    #[error("Failed to read GeoJSON file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid GeoJSON in {path}: {reason}")]
    InvalidGeoJson { path: PathBuf, reason: String },
}

/// Errors that occur while placing a file at the destination
#[derive(Error, Debug)]
pub enum MoveError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to reserve destination {path}: {source}")]
    Reserve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No free file name for {path} after {attempts} attempts")]
    NoFreeName { path: PathBuf, attempts: usize },

    #[error("Failed to move {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot derive a destination for {path}")]
    Unplaceable { path: PathBuf },
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, MediaSorterError>;
