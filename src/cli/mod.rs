//! # CLI Module
//!
//! Command-line interface for the media sorter.
//!
//! ## Usage
//! ```bash
//! # Sort by date into year/month folders
//! media-sort --input ~/Inbox --output ~/Library
//!
//! # Numeric month folders, drop duplicates
//! media-sort -i ~/Inbox -o ~/Library --format number --duplicate delete
//!
//! # Sort by country
//! media-sort -i ~/Inbox -o ~/Library --location --geojson countries.geojson
//!
//! # Only JPEG and MP4, leave everything else alone
//! media-sort -i ~/Inbox -o ~/Library --types .jpg,.mp4 --no-unknown
//! ```

use clap::{Parser, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use media_sorter::core::classify::parse_extension_list;
use media_sorter::core::destination::{MonthFormat, OrganizeMode};
use media_sorter::core::duplicate::DuplicateStrategy;
use media_sorter::core::geo::geojson::load_feature_collection;
use media_sorter::core::pipeline::{Pipeline, PipelineResult};
use media_sorter::error::{ConfigError, Result};
use media_sorter::events::{Event, EventChannel, IndexEvent, MoveEvent, PipelineEvent, PipelinePhase, WalkEvent};
use std::path::{Path, PathBuf};
use std::thread;

/// Media Sorter - Organize photos and videos by date or location
#[derive(Parser, Debug)]
#[command(name = "media-sort")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Folder to organize
    #[arg(short, long)]
    input: PathBuf,

    /// Library root the files are moved into
    #[arg(short, long)]
    output: PathBuf,

    /// What to do with duplicates: move, skip or delete
    #[arg(short, long, default_value = "move")]
    duplicate: DuplicateStrategy,

    /// Move files that are neither photos nor videos to unknown/ (default)
    #[arg(long, overrides_with = "no_unknown")]
    unknown: bool,

    /// Leave unknown files where they are
    #[arg(long = "no-unknown", overrides_with = "unknown")]
    no_unknown: bool,

    /// Organize by country instead of date
    #[arg(long)]
    location: bool,

    /// GeoJSON FeatureCollection with country polygons
    #[arg(long, value_name = "FILE")]
    geojson: Option<PathBuf>,

    /// Only handle these extensions, e.g. ".jpg,.mp4"
    #[arg(long)]
    types: Option<String>,

    /// Do not organize photos
    #[arg(long)]
    no_photo: bool,

    /// Do not organize videos
    #[arg(long)]
    no_video: bool,

    /// Month folder format: word, number or combined
    #[arg(short, long, default_value = "word")]
    format: MonthFormat,

    /// Hash cache file
    #[arg(long, value_name = "FILE")]
    cache: Option<PathBuf>,

    /// Do not read or write a hash cache
    #[arg(long, conflicts_with = "cache")]
    no_cache: bool,

    /// Worker threads on each side of the queue
    #[arg(short, long)]
    workers: Option<usize>,

    /// Summary format
    #[arg(long, default_value = "pretty")]
    summary: SummaryFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// The last of `--unknown`/`--no-unknown` wins; on by default
    fn move_unknown(&self) -> bool {
        self.unknown || !self.no_unknown
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SummaryFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    media_sorter::init_tracing(cli.verbose);

    let pipeline = build_pipeline(&cli)?;
    let term = Term::stderr();

    if matches!(cli.summary, SummaryFormat::Pretty) {
        term.write_line(&format!(
            "{} {}",
            style("Media Sorter").bold().cyan(),
            style(concat!("v", env!("CARGO_PKG_VERSION"))).dim()
        ))
        .ok();
        term.write_line("").ok();
    }

    // Set up event handling
    let (sender, receiver) = EventChannel::new();

    let progress = if matches!(cli.summary, SummaryFormat::Pretty) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(spinner_style());
        Some(pb)
    } else {
        None
    };

    let progress_clone = progress.clone();

    // Handle events in a separate thread
    let event_thread = thread::spawn(move || {
        let Some(pb) = progress_clone else {
            for _ in receiver.iter() {}
            return;
        };

        for event in receiver.iter() {
            match event {
                Event::Pipeline(PipelineEvent::PhaseChanged { phase }) => {
                    if phase == PipelinePhase::Organizing {
                        pb.set_length(0);
                        pb.set_style(bar_style());
                    }
                    pb.set_message(format!("{}", phase));
                }
                Event::Index(IndexEvent::Progress(p)) => {
                    pb.set_message(format!("Indexing destination ({} files)", p.hashed));
                    pb.tick();
                }
                Event::Walk(WalkEvent::FileQueued { .. }) => pb.inc_length(1),
                Event::Move(MoveEvent::Placed { .. }) | Event::Move(MoveEvent::Failed { .. }) => {
                    pb.inc(1)
                }
                Event::Pipeline(PipelineEvent::Completed { .. }) => pb.finish_and_clear(),
                _ => {}
            }
        }
    });

    // Run the pipeline
    let result = pipeline.run_with_events(&sender);

    // Drop sender to signal event thread to finish
    drop(sender);
    event_thread.join().ok();
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let result = result?;
    match cli.summary {
        SummaryFormat::Pretty => print_pretty_results(&term, &result, cli.verbose),
        SummaryFormat::Json => print_json_results(&result),
    }

    Ok(())
}

fn build_pipeline(cli: &Cli) -> Result<Pipeline> {
    let mut builder = Pipeline::builder()
        .source(&cli.input)
        .destination(&cli.output)
        .strategy(cli.duplicate)
        .month_format(cli.format)
        .organize_photos(!cli.no_photo)
        .organize_videos(!cli.no_video)
        .move_unknown(cli.move_unknown());

    if let Some(ref types) = cli.types {
        builder = builder.extensions(parse_extension_list(types)?);
    }

    if let Some(workers) = cli.workers {
        builder = builder.workers(workers);
    }

    if !cli.no_cache {
        builder = builder.cache_path(cli.cache.clone().unwrap_or_else(default_cache_path));
    }

    if cli.location {
        let geojson = cli.geojson.as_ref().ok_or(ConfigError::MissingCountryData)?;
        let countries = load_feature_collection(geojson)?;
        builder = builder.mode(OrganizeMode::Geo).countries(countries);
    }

    Ok(builder.build())
}

fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("media-sorter")
        .join("hash_cache.json")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░")
}

fn print_pretty_results(term: &Term, result: &PipelineResult, verbose: bool) {
    let summary = &result.summary;

    term.write_line("").ok();
    term.write_line(&format!("{} Sort Complete", style("✓").green().bold()))
        .ok();
    term.write_line("").ok();

    term.write_line(&format!(
        "  {} files found, {} processed in {:.1}s",
        style(summary.discovered).cyan(),
        style(summary.processed()).cyan(),
        summary.duration_ms as f64 / 1000.0
    ))
    .ok();

    let lines = [
        ("moved", summary.moved),
        ("unknown files moved", summary.unknown_moved),
        ("duplicates moved", summary.duplicates_moved),
        ("duplicates skipped", summary.duplicates_skipped),
        ("duplicates deleted", summary.duplicates_deleted),
        ("unknown files left in place", summary.unknown_dropped),
        ("excluded by type filter", summary.excluded),
    ];
    for (label, count) in lines.iter().filter(|(_, count)| *count > 0) {
        term.write_line(&format!("  {} {}", style(count).cyan(), label))
            .ok();
    }

    if summary.cache_hits > 0 {
        term.write_line(&format!(
            "  {} cache hits, {} files hashed",
            style(summary.cache_hits).dim(),
            style(summary.cache_misses).dim()
        ))
        .ok();
    }

    term.write_line("").ok();

    if result.issues.errors.is_empty() {
        term.write_line(&format!("  {} No errors", style("✓").green()))
            .ok();
    } else {
        term.write_line(&format!(
            "{}",
            style(format!("{} errors:", result.issues.errors.len()))
                .red()
                .bold()
        ))
        .ok();
        for error in &result.issues.errors {
            term.write_line(&format!("    {} {}", style("✗").red(), error))
                .ok();
        }
    }

    if !result.issues.warnings.is_empty() {
        term.write_line(&format!(
            "  {} {}",
            style(result.issues.warnings.len()).yellow(),
            style("warnings").yellow()
        ))
        .ok();
        if verbose {
            for warning in &result.issues.warnings {
                term.write_line(&format!("    {} {}", style("!").yellow(), display_path(warning)))
                    .ok();
            }
        }
    }

    term.write_line(&format!("  {}", style(format!("Run {}", summary.run_id)).dim()))
        .ok();
}

fn print_json_results(result: &PipelineResult) {
    let output = serde_json::json!({
        "summary": result.summary,
        "processed": result.summary.processed(),
        "errors": result.issues.errors,
        "warnings": result.issues.warnings,
    });

    match serde_json::to_string_pretty(&output) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Failed to render summary: {}", e),
    }
}

/// Shorten a message that starts with a path under the home directory
fn display_path(message: &str) -> String {
    let Some(home) = dirs::home_dir() else {
        return message.to_string();
    };

    match Path::new(message).strip_prefix(&home) {
        Ok(rest) => format!("~/{}", rest.display()),
        Err(_) => message.to_string(),
    }
}
