//! # Classify Module
//!
//! Decides what kind of media a file is, purely from its path.
//!
//! ## Categories
//! - `Image` / `Video` - extension found in the fixed tables and that kind
//!   of media is being organized
//! - `Excluded` - an extension allow-list is configured and the file's
//!   extension is not on it
//! - `Unknown` - anything else (no placement can be derived from metadata)
//! - `Folder` - directories, never emitted by the walker
//!
//! Extension matching is case-insensitive throughout.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Extensions treated as photos
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "heic", "heif", "raw", "cr2",
    "nef", "dng", "arw", "raf",
];

/// Extensions treated as videos
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "wmv", "webm", "m4v", "3gp", "mts",
];

/// Category of a file observed by the walker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileCategory {
    Image,
    Video,
    Unknown,
    Excluded,
    Folder,
}

impl FileCategory {
    /// Name of the per-kind subfolder at the destination, if any
    pub fn media_folder(&self) -> Option<&'static str> {
        match self {
            FileCategory::Image => Some("images"),
            FileCategory::Video => Some("videos"),
            _ => None,
        }
    }

    /// Whether the file carries media we organize by metadata
    pub fn is_media(&self) -> bool {
        matches!(self, FileCategory::Image | FileCategory::Video)
    }
}

/// Lowercased extension without the leading dot
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(normalize_extension)
}

pub fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&normalize_extension(ext).as_str())
}

pub fn is_video_extension(ext: &str) -> bool {
    VIDEO_EXTENSIONS.contains(&normalize_extension(ext).as_str())
}

/// Parse a comma separated extension list such as `".jpg, .MP4"`.
///
/// Every entry must be a known photo or video extension.
pub fn parse_extension_list(raw: &str) -> Result<Vec<String>, ConfigError> {
    raw.split(',')
        .map(normalize_extension)
        .filter(|ext| !ext.is_empty())
        .map(|ext| {
            if is_image_extension(&ext) || is_video_extension(&ext) {
                Ok(ext)
            } else {
                Err(ConfigError::InvalidExtension { value: ext })
            }
        })
        .collect()
}

/// Extension based classifier
#[derive(Debug, Clone)]
pub struct Classifier {
    organize_photos: bool,
    organize_videos: bool,
    allowed: Option<HashSet<String>>,
}

impl Classifier {
    /// Create a classifier.
    ///
    /// An empty allow-list is treated as no allow-list.
    pub fn new(organize_photos: bool, organize_videos: bool, allow_list: Option<&[String]>) -> Self {
        let allowed = allow_list
            .filter(|list| !list.is_empty())
            .map(|list| list.iter().map(|e| normalize_extension(e)).collect());

        Self {
            organize_photos,
            organize_videos,
            allowed,
        }
    }

    /// Classify a path.
    pub fn classify(&self, path: &Path) -> FileCategory {
        if path.is_dir() {
            return FileCategory::Folder;
        }

        let ext = extension_of(path).unwrap_or_default();

        if let Some(ref allowed) = self.allowed {
            if !allowed.contains(&ext) {
                return FileCategory::Excluded;
            }
        }

        if self.organize_photos && is_image_extension(&ext) {
            FileCategory::Image
        } else if self.organize_videos && is_video_extension(&ext) {
            FileCategory::Video
        } else {
            FileCategory::Unknown
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(true, true, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn classifies_by_extension_case_insensitively() {
        let classifier = Classifier::default();
        assert_eq!(classifier.classify(Path::new("/in/a.jpg")), FileCategory::Image);
        assert_eq!(classifier.classify(Path::new("/in/a.JPEG")), FileCategory::Image);
        assert_eq!(classifier.classify(Path::new("/in/clip.MoV")), FileCategory::Video);
    }

    #[test]
    fn unrecognised_extension_is_unknown() {
        let classifier = Classifier::default();
        assert_eq!(classifier.classify(Path::new("/in/notes.txt")), FileCategory::Unknown);
        assert_eq!(classifier.classify(Path::new("/in/README")), FileCategory::Unknown);
    }

    #[test]
    fn disabled_kind_becomes_unknown() {
        let classifier = Classifier::new(true, false, None);
        assert_eq!(classifier.classify(Path::new("/in/clip.mp4")), FileCategory::Unknown);
        assert_eq!(classifier.classify(Path::new("/in/a.png")), FileCategory::Image);
    }

    #[test]
    fn allow_list_excludes_everything_else() {
        let allow = vec![".JPG".to_string()];
        let classifier = Classifier::new(true, true, Some(allow.as_slice()));
        assert_eq!(classifier.classify(Path::new("/in/a.jpg")), FileCategory::Image);
        assert_eq!(classifier.classify(Path::new("/in/a.png")), FileCategory::Excluded);
        assert_eq!(classifier.classify(Path::new("/in/notes.txt")), FileCategory::Excluded);
    }

    #[test]
    fn empty_allow_list_is_ignored() {
        let classifier = Classifier::new(true, true, Some(&[][..]));
        assert_eq!(classifier.classify(Path::new("/in/a.png")), FileCategory::Image);
    }

    #[test]
    fn directories_are_folders() {
        let temp_dir = TempDir::new().unwrap();
        let classifier = Classifier::default();
        assert_eq!(classifier.classify(temp_dir.path()), FileCategory::Folder);
    }

    #[test]
    fn parse_extension_list_normalizes() {
        let parsed = parse_extension_list(".JPG, mp4,,.png").unwrap();
        assert_eq!(parsed, vec!["jpg", "mp4", "png"]);
    }

    #[test]
    fn parse_extension_list_rejects_unknown_types() {
        let err = parse_extension_list(".jpg,.docx").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidExtension { ref value } if value == "docx"));
    }

    #[test]
    fn media_folder_names() {
        assert_eq!(FileCategory::Image.media_folder(), Some("images"));
        assert_eq!(FileCategory::Video.media_folder(), Some("videos"));
        assert_eq!(FileCategory::Unknown.media_folder(), None);
    }
}
