//! # Metadata Module
//!
//! Reads capture time and GPS position from media files.
//!
//! The rest of the pipeline only sees the [`MetadataReader`] capability, so
//! tests can substitute a fake. Missing metadata is a normal outcome and is
//! reported as `None`, never as an error.
//!
//! ## Extracted Fields
//! - Capture time (DateTimeOriginal, then DateTimeDigitized, then DateTime)
//! - GPS latitude/longitude (degrees/minutes/seconds with N/S/E/W refs)

use crate::core::geo::Coordinates;
use chrono::NaiveDateTime;
use exif::{Exif, In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Capability: read creation time and coordinates from a file
pub trait MetadataReader: Send + Sync {
    /// Capture time recorded in the file's metadata
    fn creation_time(&self, path: &Path) -> Option<NaiveDateTime>;

    /// GPS position recorded in the file's metadata
    fn coordinates(&self, path: &Path) -> Option<Coordinates>;
}

/// EXIF-backed metadata reader
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifMetadata;

impl ExifMetadata {
    pub fn new() -> Self {
        Self
    }

    fn read_exif(path: &Path) -> Option<Exif> {
        let file = File::open(path).ok()?;
        let mut reader = BufReader::new(file);
        Reader::new().read_from_container(&mut reader).ok()
    }
}

impl MetadataReader for ExifMetadata {
    fn creation_time(&self, path: &Path) -> Option<NaiveDateTime> {
        let exif = Self::read_exif(path)?;

        [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime]
            .into_iter()
            .filter_map(|tag| exif.get_field(tag, In::PRIMARY))
            .find_map(|field| get_string_value(&field.value).and_then(|s| parse_exif_datetime(&s)))
    }

    fn coordinates(&self, path: &Path) -> Option<Coordinates> {
        let exif = Self::read_exif(path)?;

        let latitude = read_gps_axis(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, 'S')?;
        let longitude = read_gps_axis(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, 'W')?;

        Coordinates::new(latitude, longitude)
    }
}

/// Parse an EXIF timestamp ("YYYY:MM:DD HH:MM:SS", dashes tolerated)
fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim_matches(|c: char| c == '"' || c == '\0' || c.is_whitespace());

    NaiveDateTime::parse_from_str(s, "%Y:%m:%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

/// Convert one GPS axis (three rationals) into signed decimal degrees
fn read_gps_axis(exif: &Exif, value_tag: Tag, ref_tag: Tag, negative_ref: char) -> Option<f64> {
    let field = exif.get_field(value_tag, In::PRIMARY)?;
    let degrees = match field.value {
        Value::Rational(ref parts) if !parts.is_empty() => {
            let part = |i: usize| parts.get(i).map(|r| r.to_f64()).unwrap_or(0.0);
            dms_to_decimal(part(0), part(1), part(2))
        }
        _ => return None,
    };

    let negative = exif
        .get_field(ref_tag, In::PRIMARY)
        .and_then(|f| get_string_value(&f.value))
        .map(|r| r.trim().eq_ignore_ascii_case(&negative_ref.to_string()))
        .unwrap_or(false);

    if !degrees.is_finite() {
        return None;
    }

    Some(if negative { -degrees } else { degrees })
}

fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    degrees + minutes / 60.0 + seconds / 3600.0
}

/// Helper to extract string from EXIF ASCII value
fn get_string_value(value: &Value) -> Option<String> {
    if let Value::Ascii(ref vec) = value {
        if let Some(bytes) = vec.first() {
            if let Ok(s) = std::str::from_utf8(bytes) {
                let trimmed = s.trim_end_matches('\0').trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parse_standard_exif_datetime() {
        let parsed = parse_exif_datetime("2023:06:01 14:30:00").unwrap();
        assert_eq!((parsed.year(), parsed.month(), parsed.day()), (2023, 6, 1));
        assert_eq!(parsed.hour(), 14);
    }

    #[test]
    fn parse_dashed_and_quoted_datetime() {
        assert!(parse_exif_datetime("\"2024-01-15 14:30:00\"").is_some());
        assert!(parse_exif_datetime("2024:01:15 14:30:00\0").is_some());
    }

    #[test]
    fn parse_rejects_placeholder_dates() {
        assert!(parse_exif_datetime("0000:00:00 00:00:00").is_none());
        assert!(parse_exif_datetime("").is_none());
    }

    #[test]
    fn dms_conversion() {
        let decimal = dms_to_decimal(52.0, 30.0, 36.0);
        assert!((decimal - 52.51).abs() < 1e-9);
    }

    #[test]
    fn ascii_values_are_trimmed() {
        let value = Value::Ascii(vec![b"N\0".to_vec()]);
        assert_eq!(get_string_value(&value), Some("N".to_string()));
        assert_eq!(get_string_value(&Value::Ascii(vec![])), None);
    }

    #[test]
    fn missing_file_has_no_metadata() {
        let reader = ExifMetadata::new();
        let path = Path::new("/nonexistent/file.jpg");
        assert!(reader.creation_time(path).is_none());
        assert!(reader.coordinates(path).is_none());
    }

    #[test]
    fn file_without_exif_has_no_metadata() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("plain.jpg");
        std::fs::write(&path, [0xFF, 0xD8, 0xFF, 0xD9]).unwrap();

        let reader = ExifMetadata::new();
        assert!(reader.creation_time(&path).is_none());
        assert!(reader.coordinates(&path).is_none());
    }
}
