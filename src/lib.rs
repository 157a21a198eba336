//! # Media Sorter
//!
//! Moves photos and videos from an inbox folder into a library organized by
//! capture date or by country, without ever overwriting a file.
//!
//! ## Core Philosophy
//! - **Never lose data** - Name clashes get a numeric suffix, nothing is overwritten
//! - **Content, not names** - Duplicates are found by SHA-256 of the whole file
//! - **Keep going** - A bad file is reported and skipped, the run continues
//!
//! ## Architecture
//! The library is split into a core engine and presentation layers:
//! - `core` - The sorting engine
//! - `events` - Event-driven progress reporting
//! - `error` - Error types
//! - `cli` - Command-line interface (binary only)

pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{MediaSorterError, Result};

/// Initialize tracing for the library
///
/// This should be called by the application entry point. `RUST_LOG` takes
/// precedence over the `verbose` default. Calling it twice is harmless.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
