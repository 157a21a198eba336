//! Pipeline execution implementation.

use super::sink::{IssueReport, IssueSink, DEFAULT_SINK_CAPACITY};
use crate::core::cache::{ContentHasher, HashCache};
use crate::core::classify::{is_image_extension, is_video_extension, normalize_extension, Classifier};
use crate::core::destination::{DestinationResolver, MonthFormat, OrganizeMode};
use crate::core::duplicate::{DestinationIndex, DuplicateResolver, DuplicateStrategy};
use crate::core::geo::{CountryFeature, PolygonIndex};
use crate::core::metadata::{ExifMetadata, MetadataReader};
use crate::core::mover::{MoveStats, Mover};
use crate::core::walker::{WalkServices, WalkSettings, WalkStats, Walker};
use crate::error::{ConfigError, Result};
use crate::events::{null_sender, Event, EventSender, PipelineEvent, PipelinePhase};
use crossbeam_channel::bounded;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Capacity of the queue between walker and movers
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Half the available parallelism, at least one
pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(1)
        .max(1)
}

/// Configuration for one run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Tree to organize
    pub source: PathBuf,
    /// Root of the organized library
    pub destination: PathBuf,
    pub organize_photos: bool,
    pub organize_videos: bool,
    /// Only these extensions are considered (None = all)
    pub extensions: Option<Vec<String>>,
    pub month_format: MonthFormat,
    pub mode: OrganizeMode,
    pub strategy: DuplicateStrategy,
    /// Move files that are neither photos nor videos to `unknown/`
    pub move_unknown: bool,
    pub walker_workers: usize,
    pub mover_workers: usize,
    pub queue_capacity: usize,
    /// Hash cache snapshot (None = in-memory only)
    pub cache_path: Option<PathBuf>,
    /// Country polygons for location mode
    pub countries: Vec<CountryFeature>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            destination: PathBuf::new(),
            organize_photos: true,
            organize_videos: true,
            extensions: None,
            month_format: MonthFormat::Word,
            mode: OrganizeMode::Date,
            strategy: DuplicateStrategy::Move,
            move_unknown: true,
            walker_workers: default_workers(),
            mover_workers: default_workers(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            cache_path: None,
            countries: Vec::new(),
        }
    }
}

/// Canonical source and destination roots of a validated config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPaths {
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl PipelineConfig {
    /// Run every fatal check. Nothing on disk is modified.
    pub fn validate(&self) -> std::result::Result<ValidatedPaths, ConfigError> {
        let source = existing_dir("Source", &self.source)?;
        let destination = existing_dir("Destination", &self.destination)?;

        if source.starts_with(&destination) || destination.starts_with(&source) {
            return Err(ConfigError::OverlappingPaths {
                source_path: source,
                destination,
            });
        }

        if let Some(ref extensions) = self.extensions {
            for ext in extensions {
                let normalized = normalize_extension(ext);
                if !is_image_extension(&normalized) && !is_video_extension(&normalized) {
                    return Err(ConfigError::InvalidExtension { value: ext.clone() });
                }
            }
        }

        if !self.organize_photos && !self.organize_videos && !self.move_unknown {
            return Err(ConfigError::NothingToOrganize);
        }

        if self.mode == OrganizeMode::Geo && self.countries.is_empty() {
            return Err(ConfigError::MissingCountryData);
        }

        Ok(ValidatedPaths {
            source,
            destination,
        })
    }
}

fn existing_dir(role: &'static str, path: &Path) -> std::result::Result<PathBuf, ConfigError> {
    let not_found = || ConfigError::PathNotFound {
        role,
        path: path.to_path_buf(),
    };

    let metadata = fs::metadata(path).map_err(|_| not_found())?;
    if !metadata.is_dir() {
        return Err(ConfigError::NotADirectory {
            role,
            path: path.to_path_buf(),
        });
    }
    fs::canonicalize(path).map_err(|_| not_found())
}

/// Counters for a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Regular files found in the source tree
    pub discovered: usize,
    pub moved: usize,
    pub duplicates_moved: usize,
    pub duplicates_skipped: usize,
    pub duplicates_deleted: usize,
    pub unknown_moved: usize,
    pub unknown_dropped: usize,
    pub excluded: usize,
    pub errors: usize,
    pub warnings: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// Distinct contents already present at the destination
    pub indexed: usize,
    pub duration_ms: u64,
}

impl RunSummary {
    fn new(run_id: Uuid, walk: &WalkStats, moves: &MoveStats) -> Self {
        Self {
            run_id,
            discovered: walk.discovered,
            moved: moves.moved,
            duplicates_moved: moves.duplicates_moved,
            duplicates_skipped: walk.duplicates_skipped,
            duplicates_deleted: walk.duplicates_deleted,
            unknown_moved: moves.unknown_moved,
            unknown_dropped: walk.unknown_dropped,
            excluded: walk.excluded,
            errors: 0,
            warnings: 0,
            cache_hits: 0,
            cache_misses: 0,
            indexed: 0,
            duration_ms: 0,
        }
    }

    /// Files that were moved, skipped or deleted
    pub fn processed(&self) -> usize {
        self.moved
            + self.duplicates_moved
            + self.unknown_moved
            + self.duplicates_skipped
            + self.duplicates_deleted
    }
}

/// Result of pipeline execution
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub summary: RunSummary,
    /// Per-file errors and warnings, in the order they were logged
    pub issues: IssueReport,
}

/// Builder for pipeline configuration
pub struct PipelineBuilder {
    config: PipelineConfig,
    hasher: Option<Box<dyn ContentHasher>>,
    metadata: Option<Box<dyn MetadataReader>>,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            hasher: None,
            metadata: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the tree to organize
    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.source = path.into();
        self
    }

    /// Set the library root
    pub fn destination(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.destination = path.into();
        self
    }

    pub fn organize_photos(mut self, enabled: bool) -> Self {
        self.config.organize_photos = enabled;
        self
    }

    pub fn organize_videos(mut self, enabled: bool) -> Self {
        self.config.organize_videos = enabled;
        self
    }

    /// Restrict the run to these extensions
    pub fn extensions(mut self, extensions: Vec<String>) -> Self {
        self.config.extensions = Some(extensions);
        self
    }

    pub fn month_format(mut self, format: MonthFormat) -> Self {
        self.config.month_format = format;
        self
    }

    pub fn mode(mut self, mode: OrganizeMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Set the duplicate strategy
    pub fn strategy(mut self, strategy: DuplicateStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn move_unknown(mut self, enabled: bool) -> Self {
        self.config.move_unknown = enabled;
        self
    }

    /// Use `count` workers on both ends of the queue
    pub fn workers(mut self, count: usize) -> Self {
        self.config.walker_workers = count.max(1);
        self.config.mover_workers = count.max(1);
        self
    }

    pub fn walker_workers(mut self, count: usize) -> Self {
        self.config.walker_workers = count.max(1);
        self
    }

    pub fn mover_workers(mut self, count: usize) -> Self {
        self.config.mover_workers = count.max(1);
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity.max(1);
        self
    }

    /// Persist the hash cache at `path`
    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cache_path = Some(path.into());
        self
    }

    /// Load country polygons for location mode
    pub fn countries(mut self, countries: Vec<CountryFeature>) -> Self {
        self.config.countries = countries;
        self
    }

    /// Set the metadata reader (defaults to EXIF)
    pub fn metadata(mut self, reader: Box<dyn MetadataReader>) -> Self {
        self.metadata = Some(reader);
        self
    }

    /// Set the content hasher (defaults to SHA-256)
    pub fn hasher(mut self, hasher: Box<dyn ContentHasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    /// Build the pipeline
    pub fn build(self) -> Pipeline {
        let cache = match self.hasher {
            Some(hasher) => HashCache::with_hasher(hasher),
            None => HashCache::new(),
        };
        let countries = PolygonIndex::new(self.config.countries.clone());

        Pipeline {
            config: self.config,
            cache,
            metadata: self
                .metadata
                .unwrap_or_else(|| Box::new(ExifMetadata::new())),
            countries,
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The sorting pipeline
pub struct Pipeline {
    config: PipelineConfig,
    cache: HashCache,
    metadata: Box<dyn MetadataReader>,
    countries: PolygonIndex,
}

impl Pipeline {
    /// Create a new pipeline builder
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The hash cache shared by every run of this pipeline
    pub fn cache(&self) -> &HashCache {
        &self.cache
    }

    /// Run the pipeline without events
    pub fn run(&self) -> Result<PipelineResult> {
        self.run_with_events(&null_sender())
    }

    /// Run the pipeline with event reporting
    pub fn run_with_events(&self, events: &EventSender) -> Result<PipelineResult> {
        let start_time = Instant::now();
        let paths = self.config.validate()?;
        let run_id = Uuid::new_v4();
        let cache_before = self.cache.stats();

        info!(
            %run_id,
            "Organizing {} into {}",
            paths.source.display(),
            paths.destination.display()
        );
        events.send(Event::Pipeline(PipelineEvent::Started));

        let (issues, logger) = IssueSink::spawn(DEFAULT_SINK_CAPACITY);

        // Phase 1: Indexing
        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Indexing,
        }));

        if let Some(ref cache_path) = self.config.cache_path {
            match self.cache.load_snapshot(cache_path) {
                Ok(loaded) => debug!("Loaded {} cached hashes from {}", loaded, cache_path.display()),
                Err(e) => issues.warning(cache_path, format!("{}; starting with an empty cache", e)),
            }
        }

        let (index, unindexed) = DestinationIndex::build(&paths.destination, &self.cache, events);
        let indexed = index.len();
        if unindexed > 0 {
            issues.warning(
                &paths.destination,
                format!("{} existing files could not be hashed", unindexed),
            );
        }

        // Phase 2: Organizing
        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Organizing,
        }));

        let destinations =
            DestinationResolver::new(&paths.destination, self.config.mode, self.config.month_format);
        let (walk, moves) = self.organize(&paths, &index, &destinations, &issues, events);

        // Phase 3: Saving
        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Saving,
        }));

        if let Some(ref cache_path) = self.config.cache_path {
            let pruned = self.cache.prune_missing();
            match self.cache.save_snapshot(cache_path) {
                Ok(saved) => debug!(
                    "Saved {} hashes to {} ({} pruned)",
                    saved,
                    cache_path.display(),
                    pruned
                ),
                Err(e) => issues.warning(cache_path, e.to_string()),
            }
        }

        drop(issues);
        let report = logger.finish();

        let cache_after = self.cache.stats();
        let duration_ms = start_time.elapsed().as_millis() as u64;
        let summary = RunSummary {
            errors: report.errors.len(),
            warnings: report.warnings.len(),
            cache_hits: cache_after.hits - cache_before.hits,
            cache_misses: cache_after.misses - cache_before.misses,
            indexed,
            duration_ms,
            ..RunSummary::new(run_id, &walk, &moves)
        };

        events.send(Event::Pipeline(PipelineEvent::Completed {
            processed: summary.processed(),
            duration_ms,
        }));
        info!(
            %run_id,
            "Processed {} files ({} errors, {} warnings) in {} ms",
            summary.processed(),
            summary.errors,
            summary.warnings,
            duration_ms
        );

        Ok(PipelineResult {
            summary,
            issues: report,
        })
    }

    /// Run walker and movers against one bounded queue until both are done
    fn organize(
        &self,
        paths: &ValidatedPaths,
        index: &DestinationIndex,
        destinations: &DestinationResolver,
        issues: &IssueSink,
        events: &EventSender,
    ) -> (WalkStats, MoveStats) {
        let classifier = Classifier::new(
            self.config.organize_photos,
            self.config.organize_videos,
            self.config.extensions.as_deref(),
        );

        let walker = Walker::new(
            WalkSettings {
                source: paths.source.clone(),
                strategy: self.config.strategy,
                move_unknown: self.config.move_unknown,
                workers: self.config.walker_workers,
            },
            classifier,
            WalkServices {
                metadata: self.metadata.as_ref(),
                countries: &self.countries,
                duplicates: DuplicateResolver::new(&self.cache, index),
                destinations,
            },
            issues.clone(),
            events.clone(),
        );
        let mover = Mover::new(
            destinations,
            self.config.mover_workers,
            issues.clone(),
            events.clone(),
        )
        .with_cache(&self.cache);

        let (queue_tx, queue_rx) = bounded(self.config.queue_capacity.max(1));

        thread::scope(|scope| {
            let consumer = scope.spawn(|| mover.run(queue_rx));
            let walk = walker.run(queue_tx);
            let moves = match consumer.join() {
                Ok(moves) => moves,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            (walk, moves)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaSorterError;
    use tempfile::TempDir;

    fn dirs() -> (TempDir, TempDir) {
        (TempDir::new().unwrap(), TempDir::new().unwrap())
    }

    #[test]
    fn pipeline_builder_creates_pipeline() {
        let pipeline = Pipeline::builder()
            .source("/photos/inbox")
            .destination("/photos/library")
            .strategy(DuplicateStrategy::Skip)
            .month_format(MonthFormat::Combined)
            .workers(3)
            .build();

        let config = pipeline.config();
        assert_eq!(config.strategy, DuplicateStrategy::Skip);
        assert_eq!(config.month_format, MonthFormat::Combined);
        assert_eq!(config.walker_workers, 3);
        assert_eq!(config.mover_workers, 3);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn default_workers_is_at_least_one() {
        assert!(default_workers() >= 1);
    }

    #[test]
    fn missing_source_is_fatal() {
        let (_, dest) = dirs();
        let config = PipelineConfig {
            source: PathBuf::from("/nonexistent/inbox"),
            destination: dest.path().to_path_buf(),
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::PathNotFound { role: "Source", .. })
        ));
    }

    #[test]
    fn file_as_destination_is_fatal() {
        let (source, dest) = dirs();
        let file = dest.path().join("library.txt");
        fs::write(&file, b"not a directory").unwrap();

        let config = PipelineConfig {
            source: source.path().to_path_buf(),
            destination: file,
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotADirectory { role: "Destination", .. })
        ));
    }

    #[test]
    fn nested_paths_are_fatal() {
        let (source, _) = dirs();
        let nested = source.path().join("library");
        fs::create_dir_all(&nested).unwrap();

        let config = PipelineConfig {
            source: source.path().to_path_buf(),
            destination: nested,
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::OverlappingPaths { .. })
        ));
    }

    #[test]
    fn bad_extension_is_fatal() {
        let (source, dest) = dirs();
        let config = PipelineConfig {
            source: source.path().to_path_buf(),
            destination: dest.path().to_path_buf(),
            extensions: Some(vec![".jpg".to_string(), ".exe".to_string()]),
            ..Default::default()
        };

        match config.validate() {
            Err(ConfigError::InvalidExtension { value }) => assert_eq!(value, ".exe"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn location_mode_needs_countries() {
        let (source, dest) = dirs();
        let config = PipelineConfig {
            source: source.path().to_path_buf(),
            destination: dest.path().to_path_buf(),
            mode: OrganizeMode::Geo,
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingCountryData)
        ));
    }

    #[test]
    fn nothing_enabled_is_fatal() {
        let (source, dest) = dirs();
        let config = PipelineConfig {
            source: source.path().to_path_buf(),
            destination: dest.path().to_path_buf(),
            organize_photos: false,
            organize_videos: false,
            move_unknown: false,
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::NothingToOrganize)
        ));
    }

    #[test]
    fn invalid_config_touches_nothing() {
        let (source, dest) = dirs();
        let photo = source.path().join("a.jpg");
        fs::write(&photo, b"photo").unwrap();

        let pipeline = Pipeline::builder()
            .source(source.path())
            .destination(dest.path())
            .extensions(vec!["doc".to_string()])
            .build();

        let err = pipeline.run().unwrap_err();
        assert!(matches!(err, MediaSorterError::Config(_)));
        assert!(photo.exists());
        assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 0);
    }

    #[test]
    fn pipeline_handles_empty_directory() {
        let (source, dest) = dirs();

        let result = Pipeline::builder()
            .source(source.path())
            .destination(dest.path())
            .build()
            .run()
            .unwrap();

        assert_eq!(result.summary.discovered, 0);
        assert_eq!(result.summary.processed(), 0);
        assert!(result.issues.is_clean());
    }

    #[test]
    fn corrupted_cache_is_a_warning() {
        let (source, dest) = dirs();
        let cache_dir = TempDir::new().unwrap();
        let cache_path = cache_dir.path().join("hash_cache.json");
        fs::write(&cache_path, "{ not json").unwrap();
        fs::write(source.path().join("a.jpg"), b"photo").unwrap();

        let result = Pipeline::builder()
            .source(source.path())
            .destination(dest.path())
            .cache_path(&cache_path)
            .build()
            .run()
            .unwrap();

        assert_eq!(result.summary.warnings, 1);
        assert_eq!(result.summary.moved, 1);
        // The broken snapshot is replaced by a valid one
        let text = fs::read_to_string(&cache_path).unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&text).is_ok());
    }
}
