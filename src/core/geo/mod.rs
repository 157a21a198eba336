//! # Geo Module
//!
//! Maps GPS coordinates to a country name by point-in-polygon tests against
//! a static set of country shapes.
//!
//! ## Boundary rule
//! Rings are tested with even-odd ray casting along +x using the half-open
//! edge rule. Before casting, a point lying exactly on a ring vertex or edge
//! is classified as on the boundary, and boundary points are **inside**:
//! - on an exterior ring: the point belongs to that country
//! - on a hole's ring: the point still belongs to the country
//!
//! When several countries claim a point (shared borders), the first feature
//! in load order wins, so results are stable across runs.

pub mod geojson;

use serde::{Deserialize, Serialize};

/// Tolerance used when deciding whether a point lies on an edge
const EDGE_EPSILON: f64 = 1e-12;

/// A WGS84 position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Create coordinates, rejecting values outside the valid range
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);

        valid.then_some(Self {
            latitude,
            longitude,
        })
    }
}

/// A closed ring of `[longitude, latitude]` positions
pub type Ring = Vec<[f64; 2]>;

/// One polygon: an exterior ring and optional holes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Ring,
    #[serde(default)]
    pub holes: Vec<Ring>,
}

impl Polygon {
    pub fn new(exterior: Ring) -> Self {
        Self {
            exterior,
            holes: Vec::new(),
        }
    }

    pub fn with_holes(mut self, holes: Vec<Ring>) -> Self {
        self.holes = holes;
        self
    }

    /// Whether the polygon contains the point (boundary inclusive)
    pub fn contains(&self, x: f64, y: f64) -> bool {
        match ring_position(x, y, &self.exterior) {
            RingPosition::Outside => false,
            RingPosition::Boundary => true,
            RingPosition::Inside => !self
                .holes
                .iter()
                .any(|hole| ring_position(x, y, hole) == RingPosition::Inside),
        }
    }
}

/// A country and its shapes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryFeature {
    pub name: String,
    pub polygons: Vec<Polygon>,
}

/// Capability: resolve coordinates to a country name
pub trait CountryResolver: Send + Sync {
    fn resolve(&self, coordinates: Coordinates) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RingPosition {
    Inside,
    Outside,
    Boundary,
}

fn ring_position(x: f64, y: f64, ring: &[[f64; 2]]) -> RingPosition {
    if ring.len() < 3 {
        return RingPosition::Outside;
    }

    let mut inside = false;
    let mut j = ring.len() - 1;

    for i in 0..ring.len() {
        let [xi, yi] = ring[i];
        let [xj, yj] = ring[j];

        if on_segment(x, y, xi, yi, xj, yj) {
            return RingPosition::Boundary;
        }

        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }

        j = i;
    }

    if inside {
        RingPosition::Inside
    } else {
        RingPosition::Outside
    }
}

fn on_segment(x: f64, y: f64, ax: f64, ay: f64, bx: f64, by: f64) -> bool {
    if x < ax.min(bx) || x > ax.max(bx) || y < ay.min(by) || y > ay.max(by) {
        return false;
    }
    let cross = (bx - ax) * (y - ay) - (by - ay) * (x - ax);
    cross.abs() <= EDGE_EPSILON
}

#[derive(Debug, Clone, Copy)]
struct BoundingBox {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

impl BoundingBox {
    fn of(feature: &CountryFeature) -> Option<Self> {
        let mut points = feature.polygons.iter().flat_map(|p| p.exterior.iter());
        let [x0, y0] = *points.next()?;
        let mut bbox = Self {
            min_x: x0,
            min_y: y0,
            max_x: x0,
            max_y: y0,
        };
        for &[x, y] in points {
            bbox.min_x = bbox.min_x.min(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_x = bbox.max_x.max(x);
            bbox.max_y = bbox.max_y.max(y);
        }
        Some(bbox)
    }

    fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// Country lookup over an immutable list of features
#[derive(Debug, Clone, Default)]
pub struct PolygonIndex {
    features: Vec<(CountryFeature, BoundingBox)>,
}

impl PolygonIndex {
    /// Build the index; features without any exterior points are dropped
    pub fn new(features: Vec<CountryFeature>) -> Self {
        let features = features
            .into_iter()
            .filter_map(|f| BoundingBox::of(&f).map(|bbox| (f, bbox)))
            .collect();
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl CountryResolver for PolygonIndex {
    fn resolve(&self, coordinates: Coordinates) -> Option<String> {
        let (x, y) = (coordinates.longitude, coordinates.latitude);

        self.features
            .iter()
            .filter(|(_, bbox)| bbox.contains(x, y))
            .find(|(feature, _)| feature.polygons.iter().any(|p| p.contains(x, y)))
            .map(|(feature, _)| feature.name.clone())
    }
}
