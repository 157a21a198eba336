//! # Destination Module
//!
//! Computes where a file belongs and finds a free name for it.
//!
//! ## Layouts
//! - Date mode: `root/YYYY/<month>/{images|videos}/<name>`
//! - Geo mode: `root/<country>/{images|videos}/<name>`, or
//!   `root/unknown/<name>` when the country is unresolved
//! - Unknown files: `root/unknown/<name>` in either mode
//! - Duplicates (move strategy): `<original dir>/<original stem>_duplicates/<name>`
//!
//! ## Collisions
//! [`reserve_path`] tries `name.ext`, `name_1.ext`, `name_2.ext`, ... and
//! atomically creates an empty placeholder at the first free one. The file
//! is then renamed over its own placeholder, so two movers can never end up
//! with the same name.

use crate::core::classify::FileCategory;
use crate::core::duplicate::duplicates_folder;
use crate::core::walker::FileRecord;
use crate::error::{ConfigError, MoveError};
use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

/// Folder for files whose placement cannot be derived
pub const UNKNOWN_FOLDER: &str = "unknown";

/// Upper bound on `_N` suffixes tried for one file
pub const MAX_SUFFIX_ATTEMPTS: usize = 10_000;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// How month folders are named
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthFormat {
    /// `June`
    #[default]
    Word,
    /// `06`
    Number,
    /// `06_June`
    Combined,
}

impl MonthFormat {
    /// Folder label for a month numbered 1-12
    pub fn label(&self, month: u32) -> String {
        let name = MONTH_NAMES
            .get(month.saturating_sub(1) as usize)
            .copied()
            .unwrap_or("Unknown");

        match self {
            MonthFormat::Word => name.to_string(),
            MonthFormat::Number => format!("{:02}", month),
            MonthFormat::Combined => format!("{:02}_{}", month, name),
        }
    }
}

impl FromStr for MonthFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "word" => Ok(MonthFormat::Word),
            "number" => Ok(MonthFormat::Number),
            "combined" => Ok(MonthFormat::Combined),
            _ => Err(ConfigError::InvalidMonthFormat {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for MonthFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonthFormat::Word => write!(f, "word"),
            MonthFormat::Number => write!(f, "number"),
            MonthFormat::Combined => write!(f, "combined"),
        }
    }
}

/// Top-level folder hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizeMode {
    /// Year / month folders from the capture time
    #[default]
    Date,
    /// Country folders from GPS position
    Geo,
}

/// Pure mapping from a record to its destination path
#[derive(Debug, Clone)]
pub struct DestinationResolver {
    root: PathBuf,
    mode: OrganizeMode,
    month_format: MonthFormat,
}

impl DestinationResolver {
    pub fn new(root: impl Into<PathBuf>, mode: OrganizeMode, month_format: MonthFormat) -> Self {
        Self {
            root: root.into(),
            mode,
            month_format,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mode(&self) -> OrganizeMode {
        self.mode
    }

    /// Destination for a record, honouring its duplicate status
    pub fn resolve(&self, record: &FileRecord) -> Result<PathBuf, MoveError> {
        match record.duplicate_of {
            Some(ref original) if record.is_duplicate => {
                Ok(duplicates_folder(original).join(file_name(&record.path)?))
            }
            _ => self.canonical_path(record),
        }
    }

    /// Destination for a record as if it were not a duplicate
    pub fn canonical_path(&self, record: &FileRecord) -> Result<PathBuf, MoveError> {
        let name = file_name(&record.path)?;
        let folder = self.folder_for(record.category, &record.created_at, &record.country);
        Ok(folder.join(name))
    }

    fn folder_for(&self, category: FileCategory, created_at: &NaiveDateTime, country: &str) -> PathBuf {
        let Some(media_folder) = category.media_folder() else {
            return self.root.join(UNKNOWN_FOLDER);
        };

        match self.mode {
            OrganizeMode::Date => self
                .root
                .join(format!("{:04}", created_at.year()))
                .join(self.month_format.label(created_at.month()))
                .join(media_folder),
            OrganizeMode::Geo => {
                let country = sanitize_component(country);
                if country.is_empty() {
                    self.root.join(UNKNOWN_FOLDER)
                } else {
                    self.root.join(country).join(media_folder)
                }
            }
        }
    }
}

fn file_name(path: &Path) -> Result<&std::ffi::OsStr, MoveError> {
    path.file_name().ok_or_else(|| MoveError::Unplaceable {
        path: path.to_path_buf(),
    })
}

/// Make a metadata-derived string safe to use as one path component
fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match cleaned.as_str() {
        "." | ".." => String::new(),
        _ => cleaned,
    }
}

/// `dir/stem_N.ext` for a path `dir/stem.ext`
pub fn suffixed_path(path: &Path, n: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}_{}", stem, n),
    };
    path.with_file_name(name)
}

/// Claim the first free name among `path`, `path_1`, `path_2`, ...
///
/// The winner is created as an empty file with `create_new`, so a name
/// taken by anything (file, directory, dangling link) or by a concurrent
/// caller is skipped. The parent directory is created when missing.
pub fn reserve_path(path: &Path) -> Result<PathBuf, MoveError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    for n in 0..=MAX_SUFFIX_ATTEMPTS {
        let candidate = if n == 0 {
            path.to_path_buf()
        } else {
            suffixed_path(path, n)
        };
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(MoveError::Reserve {
                    path: candidate,
                    source: e,
                })
            }
        }
    }

    Err(MoveError::NoFreeName {
        path: path.to_path_buf(),
        attempts: MAX_SUFFIX_ATTEMPTS,
    })
}

/// Drop a placeholder left by [`reserve_path`] whose file never arrived
pub fn release_path(slot: &Path) {
    match fs::symlink_metadata(slot) {
        Ok(meta) if meta.is_file() && meta.len() == 0 => {
            if let Err(e) = fs::remove_file(slot) {
                warn!("Could not remove placeholder {}: {}", slot.display(), e);
            }
        }
        _ => {}
    }
}

/// Create `dir` and its parents; existing directories are fine
pub fn ensure_dir(dir: &Path) -> Result<(), MoveError> {
    fs::create_dir_all(dir).map_err(|e| MoveError::CreateDirectory {
        path: dir.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn record(path: &str, category: FileCategory, country: &str) -> FileRecord {
        FileRecord {
            path: PathBuf::from(path),
            category,
            created_at: NaiveDate::from_ymd_opt(2023, 6, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            has_reliable_timestamp: true,
            country: country.to_string(),
            is_duplicate: false,
            duplicate_of: None,
            reserved: None,
        }
    }

    #[test]
    fn month_labels() {
        assert_eq!(MonthFormat::Word.label(6), "June");
        assert_eq!(MonthFormat::Number.label(6), "06");
        assert_eq!(MonthFormat::Combined.label(12), "12_December");
    }

    #[test]
    fn month_format_parses() {
        assert_eq!("Combined".parse::<MonthFormat>().unwrap(), MonthFormat::Combined);
        assert!("weekday".parse::<MonthFormat>().is_err());
    }

    #[test]
    fn date_mode_layout() {
        let resolver = DestinationResolver::new("/lib", OrganizeMode::Date, MonthFormat::Word);

        let image = record("/in/a.jpg", FileCategory::Image, "");
        assert_eq!(
            resolver.resolve(&image).unwrap(),
            PathBuf::from("/lib/2023/June/images/a.jpg")
        );

        let video = record("/in/clip.mp4", FileCategory::Video, "");
        assert_eq!(
            resolver.resolve(&video).unwrap(),
            PathBuf::from("/lib/2023/June/videos/clip.mp4")
        );
    }

    #[test]
    fn number_format_layout() {
        let resolver = DestinationResolver::new("/lib", OrganizeMode::Date, MonthFormat::Number);
        let image = record("/in/a.jpg", FileCategory::Image, "");
        assert_eq!(
            resolver.resolve(&image).unwrap(),
            PathBuf::from("/lib/2023/06/images/a.jpg")
        );
    }

    #[test]
    fn geo_mode_layout() {
        let resolver = DestinationResolver::new("/lib", OrganizeMode::Geo, MonthFormat::Word);

        let located = record("/in/a.jpg", FileCategory::Image, "Greece");
        assert_eq!(
            resolver.resolve(&located).unwrap(),
            PathBuf::from("/lib/Greece/images/a.jpg")
        );

        let unresolved = record("/in/b.mov", FileCategory::Video, "");
        assert_eq!(
            resolver.resolve(&unresolved).unwrap(),
            PathBuf::from("/lib/unknown/b.mov")
        );
    }

    #[test]
    fn unknown_files_ignore_mode() {
        for mode in [OrganizeMode::Date, OrganizeMode::Geo] {
            let resolver = DestinationResolver::new("/lib", mode, MonthFormat::Word);
            let notes = record("/in/notes.txt", FileCategory::Unknown, "Greece");
            assert_eq!(
                resolver.resolve(&notes).unwrap(),
                PathBuf::from("/lib/unknown/notes.txt")
            );
        }
    }

    #[test]
    fn duplicates_go_next_to_original() {
        let resolver = DestinationResolver::new("/lib", OrganizeMode::Date, MonthFormat::Word);
        let mut dup = record("/in/b.jpg", FileCategory::Image, "");
        dup.is_duplicate = true;
        dup.duplicate_of = Some(PathBuf::from("/lib/2023/June/images/a.jpg"));

        assert_eq!(
            resolver.resolve(&dup).unwrap(),
            PathBuf::from("/lib/2023/June/images/a_duplicates/b.jpg")
        );
    }

    #[test]
    fn country_names_cannot_escape_root() {
        let resolver = DestinationResolver::new("/lib", OrganizeMode::Geo, MonthFormat::Word);
        let sneaky = record("/in/a.jpg", FileCategory::Image, "../etc");
        assert_eq!(
            resolver.resolve(&sneaky).unwrap(),
            PathBuf::from("/lib/.._etc/images/a.jpg")
        );

        let dots = record("/in/a.jpg", FileCategory::Image, "..");
        assert_eq!(
            resolver.resolve(&dots).unwrap(),
            PathBuf::from("/lib/unknown/a.jpg")
        );
    }

    #[test]
    fn suffix_goes_before_extension() {
        assert_eq!(
            suffixed_path(Path::new("/lib/a.jpg"), 2),
            PathBuf::from("/lib/a_2.jpg")
        );
        assert_eq!(
            suffixed_path(Path::new("/lib/README"), 1),
            PathBuf::from("/lib/README_1")
        );
    }

    #[test]
    fn reserve_path_skips_taken_names() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("lib/a.jpg");
        fs::create_dir_all(temp_dir.path().join("lib/a_1.jpg")).unwrap();

        assert_eq!(reserve_path(&target).unwrap(), target);
        assert_eq!(fs::metadata(&target).unwrap().len(), 0);

        // a.jpg is now the placeholder, a_1.jpg a directory
        assert_eq!(
            reserve_path(&target).unwrap(),
            temp_dir.path().join("lib/a_2.jpg")
        );
    }

    #[test]
    fn concurrent_reservations_get_distinct_names() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("a.jpg");

        let slots: Vec<PathBuf> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| scope.spawn(|| reserve_path(&target).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let distinct: std::collections::HashSet<_> = slots.iter().collect();
        assert_eq!(distinct.len(), 16);
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 16);
    }

    #[test]
    fn release_only_removes_empty_placeholders() {
        let temp_dir = TempDir::new().unwrap();
        let slot = reserve_path(&temp_dir.path().join("a.jpg")).unwrap();
        release_path(&slot);
        assert!(!slot.exists());

        let real = temp_dir.path().join("b.jpg");
        fs::write(&real, b"photo").unwrap();
        release_path(&real);
        assert!(real.exists());
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("2023/June/images");
        ensure_dir(&dir).unwrap();
        ensure_dir(&dir).unwrap();
        assert!(dir.is_dir());
    }
}
