//! # media-sort CLI
//!
//! Command-line interface for the media sorter.
//!
//! ## Usage
//! ```bash
//! media-sort --input ~/Inbox --output ~/Library
//! media-sort -i ~/Inbox -o ~/Library --duplicate skip --summary json
//! ```

mod cli;

use media_sorter::Result;

fn main() -> Result<()> {
    cli::run()
}
