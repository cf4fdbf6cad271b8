//! Auxiliary layer model and GeoJSON parsing.

use crate::error::{LayerLoadError, LayerResult};
use geo::{Area, MultiPolygon, Polygon};
use geojson::{FeatureCollection, GeoJson};
use pipecast_common::{BoundingBox, CrsCode, Field};
use projection::{reproject_multipolygon, ProjectionError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What a layer represents, which decides the statistics it produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LayerKind {
    /// Per-zone population counts (vector) or per-cell counts (raster).
    Population {
        #[serde(default)]
        attribute: Option<String>,
    },
    /// Hydrologic units.
    Watershed {
        #[serde(default)]
        id_attribute: Option<String>,
    },
    /// Any polygon layer; only counts and intersected area are reported.
    Custom,
}

impl LayerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerKind::Population { .. } => "population",
            LayerKind::Watershed { .. } => "watershed",
            LayerKind::Custom => "custom",
        }
    }

    pub fn is_population(&self) -> bool {
        matches!(self, LayerKind::Population { .. })
    }
}

/// Attribute names tried, in order, when a population layer does not name one.
pub const POPULATION_ATTRIBUTES: &[&str] =
    &["population", "Population", "POPULATION", "POP", "pop", "U7H001"];

/// Attribute names tried for a watershed identifier.
pub const WATERSHED_ID_ATTRIBUTES: &[&str] = &[
    "huc12", "HUC12", "huc10", "HUC10", "huc8", "HUC8", "id", "ID", "name", "NAME",
];

/// One polygon feature with its attributes.
#[derive(Debug, Clone)]
pub struct LayerFeature {
    pub geometry: MultiPolygon<f64>,
    pub bbox: BoundingBox,
    /// Area in the layer CRS
    pub area: f64,
    pub properties: Map<String, Value>,
}

impl LayerFeature {
    pub fn new(geometry: MultiPolygon<f64>, properties: Map<String, Value>) -> Option<Self> {
        let bbox = BoundingBox::of_geometry(&geometry)?;
        let area = geometry.unsigned_area();
        Some(Self {
            geometry,
            bbox,
            area,
            properties,
        })
    }

    /// Numeric attribute value; numeric strings are accepted.
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.properties.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .filter(|v: &f64| v.is_finite())
    }

    /// Attribute value rendered as text.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// A polygon layer in a single CRS.
#[derive(Debug, Clone)]
pub struct VectorLayer {
    pub crs: CrsCode,
    pub features: Vec<LayerFeature>,
    pub bounds: Option<BoundingBox>,
}

impl VectorLayer {
    pub fn new(crs: CrsCode, features: Vec<LayerFeature>) -> Self {
        let bounds = features
            .iter()
            .map(|f| f.bbox)
            .reduce(|a, b| a.union(&b));
        Self {
            crs,
            features,
            bounds,
        }
    }

    /// Build a layer from bare polygons with no attributes.
    pub fn from_polygons(crs: CrsCode, polygons: Vec<Polygon<f64>>) -> Self {
        let features = polygons
            .into_iter()
            .filter_map(|p| LayerFeature::new(MultiPolygon(vec![p]), Map::new()))
            .collect();
        Self::new(crs, features)
    }

    /// Parse a GeoJSON document.
    ///
    /// The CRS comes from the legacy `crs` member (`{"type": "name",
    /// "properties": {"name": ...}}`) and defaults to EPSG:4326. Only
    /// Polygon and MultiPolygon features are kept; features without
    /// geometry are skipped.
    pub fn from_geojson_str(text: &str) -> LayerResult<Self> {
        let geojson: GeoJson = text
            .parse()
            .map_err(|e: geojson::Error| LayerLoadError::Parse(e.to_string()))?;

        let collection = match geojson {
            GeoJson::FeatureCollection(fc) => fc,
            GeoJson::Feature(feature) => FeatureCollection {
                bbox: None,
                features: vec![feature],
                foreign_members: None,
            },
            GeoJson::Geometry(_) => {
                return Err(LayerLoadError::Parse(
                    "expected a Feature or FeatureCollection".to_string(),
                ))
            }
        };

        let crs = declared_crs(&collection)?;

        let mut features = Vec::with_capacity(collection.features.len());
        for feature in collection.features {
            let Some(geometry) = feature.geometry else {
                continue;
            };
            let polygons = match geometry.value {
                geojson::Value::Polygon(_) => {
                    let polygon: Polygon<f64> = geometry
                        .value
                        .try_into()
                        .map_err(|e: geojson::Error| LayerLoadError::Parse(e.to_string()))?;
                    MultiPolygon(vec![polygon])
                }
                geojson::Value::MultiPolygon(_) => geometry
                    .value
                    .try_into()
                    .map_err(|e: geojson::Error| LayerLoadError::Parse(e.to_string()))?,
                _ => continue,
            };
            if let Some(f) = LayerFeature::new(polygons, feature.properties.unwrap_or_default()) {
                features.push(f);
            }
        }

        let layer = Self::new(crs, features);
        layer.check_bounds()?;
        Ok(layer)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Features whose bounding box overlaps `bbox` (in the layer CRS).
    pub fn candidates<'a>(
        &'a self,
        bbox: &'a BoundingBox,
    ) -> impl Iterator<Item = (usize, &'a LayerFeature)> + 'a {
        self.features
            .iter()
            .enumerate()
            .filter(move |(_, f)| f.bbox.intersects(bbox))
    }

    /// First of `candidates` carried by any feature.
    pub fn detect_attribute(&self, candidates: &[&str]) -> Option<String> {
        candidates
            .iter()
            .find(|key| self.features.iter().any(|f| f.properties.contains_key(**key)))
            .map(|key| key.to_string())
    }

    /// Every feature polygon, reprojected to `target`.
    pub fn geometry_in(&self, target: CrsCode) -> Result<MultiPolygon<f64>, ProjectionError> {
        let mut polygons = Vec::new();
        for feature in &self.features {
            let projected = reproject_multipolygon(&feature.geometry, self.crs, target)?;
            polygons.extend(projected.0);
        }
        Ok(MultiPolygon(polygons))
    }

    fn check_bounds(&self) -> LayerResult<()> {
        let Some(bounds) = self.bounds else {
            return Ok(());
        };
        if self.crs.is_geographic()
            && (bounds.min_x < -360.0
                || bounds.max_x > 360.0
                || bounds.min_y < -90.0
                || bounds.max_y > 90.0)
        {
            return Err(LayerLoadError::CrsMismatch {
                declared: self.crs,
                bounds: format!(
                    "[{:.1}, {:.1}, {:.1}, {:.1}]",
                    bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y
                ),
            });
        }
        Ok(())
    }
}

fn declared_crs(collection: &FeatureCollection) -> LayerResult<CrsCode> {
    let name = collection
        .foreign_members
        .as_ref()
        .and_then(|m| m.get("crs"))
        .and_then(|crs| crs.get("properties"))
        .and_then(|p| p.get("name"))
        .and_then(|n| n.as_str());

    match name {
        Some(name) => {
            CrsCode::parse(name).map_err(|_| LayerLoadError::UnsupportedCrs(name.to_string()))
        }
        None => Ok(CrsCode::Epsg4326),
    }
}

/// A loaded auxiliary layer.
#[derive(Debug, Clone)]
pub enum LoadedLayer {
    Vector(VectorLayer),
    /// Gridded values, e.g. population per cell
    Raster(Field),
}

impl LoadedLayer {
    pub fn crs(&self) -> CrsCode {
        match self {
            LoadedLayer::Vector(v) => v.crs,
            LoadedLayer::Raster(f) => f.crs(),
        }
    }

    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            LoadedLayer::Vector(v) => format!("{} features in {}", v.len(), v.crs),
            LoadedLayer::Raster(f) => format!("{}x{} raster in {}", f.width(), f.height(), f.crs()),
        }
    }
}
