//! GeoJSON loading for country shapes.
//!
//! Accepts a `FeatureCollection` whose features carry `Polygon` or
//! `MultiPolygon` geometries. The country name is taken from the first of
//! the `name`, `ADMIN` or `NAME` properties that is a string.

use super::{CountryFeature, Polygon, Ring};
use crate::error::GeoError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

const NAME_PROPERTIES: &[&str] = &["name", "ADMIN", "NAME"];

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<RawFeature>,
}

#[derive(Deserialize)]
struct RawFeature {
    #[serde(default)]
    properties: Option<Map<String, Value>>,
    #[serde(default)]
    geometry: Option<RawGeometry>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum RawGeometry {
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Vec<f64>>>> },
    #[serde(other)]
    Unsupported,
}

/// Load country features from a GeoJSON file
pub fn load_feature_collection(path: &Path) -> Result<Vec<CountryFeature>, GeoError> {
    let data = std::fs::read_to_string(path).map_err(|e| GeoError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_feature_collection(&data).map_err(|reason| GeoError::InvalidGeoJson {
        path: path.to_path_buf(),
        reason,
    })
}

/// Parse country features from GeoJSON text
pub fn parse_feature_collection(data: &str) -> Result<Vec<CountryFeature>, String> {
    let collection: FeatureCollection = serde_json::from_str(data).map_err(|e| e.to_string())?;

    let features = collection
        .features
        .into_iter()
        .enumerate()
        .filter_map(|(i, raw)| {
            let feature = convert_feature(raw);
            if feature.is_none() {
                debug!("Skipping GeoJSON feature {} without name or polygon geometry", i);
            }
            feature
        })
        .collect();

    Ok(features)
}

fn convert_feature(raw: RawFeature) -> Option<CountryFeature> {
    let properties = raw.properties?;
    let name = NAME_PROPERTIES
        .iter()
        .find_map(|key| properties.get(*key).and_then(Value::as_str))?
        .to_string();

    let polygons = match raw.geometry? {
        RawGeometry::Polygon { coordinates } => vec![convert_polygon(coordinates)?],
        RawGeometry::MultiPolygon { coordinates } => coordinates
            .into_iter()
            .filter_map(convert_polygon)
            .collect(),
        RawGeometry::Unsupported => return None,
    };

    if polygons.is_empty() {
        return None;
    }

    Some(CountryFeature { name, polygons })
}

fn convert_polygon(rings: Vec<Vec<Vec<f64>>>) -> Option<Polygon> {
    let mut rings = rings.into_iter().map(convert_ring);
    let exterior = rings.next()?;
    Some(Polygon::new(exterior).with_holes(rings.collect()))
}

/// Drop positions with fewer than two ordinates; altitude is ignored
fn convert_ring(positions: Vec<Vec<f64>>) -> Ring {
    positions
        .into_iter()
        .filter(|p| p.len() >= 2)
        .map(|p| [p[0], p[1]])
        .collect()
}
