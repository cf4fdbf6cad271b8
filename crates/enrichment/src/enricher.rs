//! Applying loaded layers to AOIs.

use crate::cache::LayerCache;
use crate::error::LayerLoadError;
use crate::layer::{
    LayerKind, LoadedLayer, VectorLayer, POPULATION_ATTRIBUTES, WATERSHED_ID_ATTRIBUTES,
};
use crate::registry::LayerRegistry;
use geo::{Area, BooleanOps, MultiPolygon};
use pipecast_common::{cell_center_coverage, Aoi, BoundingBox, CrsCode, Field, StatValue};
use projection::{reproject_bbox, reproject_multipolygon, ProjectionError};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Whether a layer can be used.
#[derive(Debug, Clone)]
pub enum LayerState {
    Ready(Arc<LoadedLayer>),
    Unavailable(String),
}

/// A registered layer after loading.
#[derive(Debug, Clone)]
pub struct EnrichmentLayer {
    pub name: String,
    pub kind: LayerKind,
    pub state: LayerState,
    /// Resolved population or watershed-id attribute
    attribute: Option<String>,
}

/// A vector feature overlapping an AOI.
struct Hit {
    index: usize,
    /// Overlap area in the AOI CRS
    area: f64,
    /// Fraction of the feature covered by the AOI
    share: f64,
}

impl EnrichmentLayer {
    /// A loaded layer. Attribute names are resolved here; a population
    /// layer without a usable attribute becomes unavailable.
    pub fn ready(name: impl Into<String>, kind: LayerKind, layer: Arc<LoadedLayer>) -> Self {
        let name = name.into();
        let resolved = match (&kind, layer.as_ref()) {
            (LayerKind::Population { attribute }, LoadedLayer::Vector(v)) => {
                match attribute
                    .clone()
                    .or_else(|| v.detect_attribute(POPULATION_ATTRIBUTES))
                {
                    Some(attr) => Ok(Some(attr)),
                    None if v.is_empty() => Ok(None),
                    None => Err(LayerLoadError::MissingAttribute(
                        POPULATION_ATTRIBUTES.join(", "),
                    )),
                }
            }
            (LayerKind::Watershed { id_attribute }, LoadedLayer::Vector(v)) => Ok(id_attribute
                .clone()
                .or_else(|| v.detect_attribute(WATERSHED_ID_ATTRIBUTES))),
            (LayerKind::Custom, LoadedLayer::Vector(_)) => Ok(None),
            (LayerKind::Population { .. }, LoadedLayer::Raster(_)) => Ok(None),
            (kind, LoadedLayer::Raster(_)) => Err(LayerLoadError::Unsupported(format!(
                "raster layers cannot be used as {} layers",
                kind.as_str()
            ))),
        };

        match resolved {
            Ok(attribute) => Self {
                name,
                kind,
                state: LayerState::Ready(layer),
                attribute,
            },
            Err(e) => Self::unavailable(name, kind, e.to_string()),
        }
    }

    pub fn unavailable(name: impl Into<String>, kind: LayerKind, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            state: LayerState::Unavailable(reason.into()),
            attribute: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, LayerState::Ready(_))
    }

    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    /// Statistics for `geometry` (in `crs`), without the layer prefix.
    pub fn compute(
        &self,
        geometry: &MultiPolygon<f64>,
        crs: CrsCode,
    ) -> Result<Vec<(&'static str, StatValue)>, String> {
        let layer = match &self.state {
            LayerState::Ready(layer) => layer,
            LayerState::Unavailable(reason) => return Err(reason.clone()),
        };

        match (layer.as_ref(), &self.kind) {
            (LoadedLayer::Raster(field), _) => {
                let (sum, cells) = raster_sum(field, geometry, crs).map_err(|e| e.to_string())?;
                Ok(vec![
                    ("population_sum", StatValue::Number(sum)),
                    ("cell_count", StatValue::Count(cells)),
                ])
            }
            (LoadedLayer::Vector(vector), kind) => {
                let hits = intersect(vector, geometry, crs).map_err(|e| e.to_string())?;
                let count = StatValue::Count(hits.len() as u64);
                let intersect_area: f64 = hits.iter().map(|h| h.area).sum();

                match kind {
                    LayerKind::Population { .. } => Ok(vec![
                        ("population_sum", StatValue::Number(self.weighted_population(vector, &hits))),
                        ("feature_count", count),
                    ]),
                    LayerKind::Watershed { .. } => {
                        let mut stats = vec![
                            ("feature_count", count),
                            ("intersect_area", StatValue::Number(intersect_area)),
                        ];
                        if let Some(id) = self.dominant_id(vector, &hits) {
                            stats.push(("dominant_id", StatValue::Text(id)));
                        }
                        Ok(stats)
                    }
                    LayerKind::Custom => Ok(vec![
                        ("feature_count", count),
                        ("intersect_area", StatValue::Number(intersect_area)),
                    ]),
                }
            }
        }
    }

    /// Population inside `geometry` for a population layer.
    pub fn population_within(&self, geometry: &MultiPolygon<f64>, crs: CrsCode) -> Option<f64> {
        if !self.kind.is_population() {
            return None;
        }
        self.compute(geometry, crs)
            .ok()?
            .into_iter()
            .find(|(key, _)| *key == "population_sum")
            .and_then(|(_, v)| v.as_f64())
    }

    /// Sum of zone populations weighted by the share of each zone's area
    /// the AOI covers.
    fn weighted_population(&self, vector: &VectorLayer, hits: &[Hit]) -> f64 {
        let Some(attr) = self.attribute.as_deref() else {
            return 0.0;
        };
        hits.iter()
            .filter_map(|hit| Some(vector.features[hit.index].number(attr)? * hit.share))
            .sum()
    }

    /// Id of the feature with the largest overlap; ties go to the earlier
    /// feature.
    fn dominant_id(&self, vector: &VectorLayer, hits: &[Hit]) -> Option<String> {
        let index = hits
            .iter()
            .max_by(|a, b| a.area.total_cmp(&b.area).then(b.index.cmp(&a.index)))?
            .index;
        let feature = &vector.features[index];
        Some(
            self.attribute
                .as_deref()
                .and_then(|attr| feature.text(attr))
                .unwrap_or_else(|| format!("feature-{}", index)),
        )
    }
}

/// Intersect every candidate feature with `geometry`.
///
/// Candidates are picked by bounding box in the layer CRS, then reprojected
/// into `crs` for the polygon intersection.
fn intersect(
    vector: &VectorLayer,
    geometry: &MultiPolygon<f64>,
    crs: CrsCode,
) -> Result<Vec<Hit>, ProjectionError> {
    let Some(bbox) = BoundingBox::of_geometry(geometry) else {
        return Ok(Vec::new());
    };
    let search = reproject_bbox(&bbox, crs, vector.crs)?;

    let mut hits = Vec::new();
    for (index, feature) in vector.candidates(&search) {
        let zone = reproject_multipolygon(&feature.geometry, vector.crs, crs)?;
        let zone_area = zone.unsigned_area();
        if zone_area <= 0.0 {
            continue;
        }
        let overlap = geometry.intersection(&zone).unsigned_area();
        if overlap > 0.0 {
            hits.push(Hit {
                index,
                area: overlap,
                share: (overlap / zone_area).min(1.0),
            });
        }
    }
    Ok(hits)
}

fn raster_sum(
    field: &Field,
    geometry: &MultiPolygon<f64>,
    crs: CrsCode,
) -> Result<(f64, u64), ProjectionError> {
    let projected = reproject_multipolygon(geometry, crs, field.crs())?;
    let mask = cell_center_coverage(&projected, field.transform(), field.width(), field.height());
    let data = field.data();
    let (sum, cells) = mask
        .covered_indices()
        .map(|i| data[i])
        .filter(|v| v.is_finite())
        .fold((0.0, 0u64), |(s, n), v| (s + v as f64, n + 1));
    Ok((sum, cells))
}

/// Applies every loaded layer to AOIs.
#[derive(Debug, Clone, Default)]
pub struct LayerEnricher {
    layers: Vec<EnrichmentLayer>,
}

impl LayerEnricher {
    pub fn new(layers: Vec<EnrichmentLayer>) -> Self {
        Self { layers }
    }

    /// Load every registered layer through `cache`. A layer that fails to
    /// load is kept as unavailable; loading never fails as a whole.
    #[instrument(skip_all, fields(layers = registry.len()))]
    pub async fn load(registry: &LayerRegistry, cache: &LayerCache) -> Self {
        let loads = registry.entries().iter().map(|entry| async move {
            match cache.get_or_load(&entry.name, entry.source.as_ref()).await {
                Ok(layer) => EnrichmentLayer::ready(entry.name.clone(), entry.kind.clone(), layer),
                Err(e) => {
                    warn!(layer = %entry.name, error = %e, "Layer unavailable");
                    EnrichmentLayer::unavailable(entry.name.clone(), entry.kind.clone(), e.to_string())
                }
            }
        });
        let layers = futures::future::join_all(loads).await;

        let ready = layers.iter().filter(|l| l.is_ready()).count();
        info!(ready, unavailable = layers.len() - ready, "Enrichment layers loaded");
        Self { layers }
    }

    pub fn layers(&self) -> &[EnrichmentLayer] {
        &self.layers
    }

    pub fn layer(&self, name: &str) -> Option<&EnrichmentLayer> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// First usable population layer.
    pub fn population_layer(&self) -> Option<&EnrichmentLayer> {
        self.layers
            .iter()
            .find(|l| l.kind.is_population() && l.is_ready())
    }

    /// Add `<layer>.<stat>` entries and a `<layer>.status` for every layer.
    pub fn enrich(&self, mut aoi: Aoi) -> Aoi {
        for layer in &self.layers {
            match layer.compute(&aoi.geometry, aoi.crs) {
                Ok(stats) => {
                    for (stat, value) in stats {
                        aoi.set_stat(&layer.name, stat, value);
                    }
                    aoi.set_stat(&layer.name, "status", StatValue::Ok);
                }
                Err(reason) => {
                    if layer.is_ready() {
                        debug!(aoi = %aoi.id, layer = %layer.name, %reason, "Layer not applicable to AOI");
                    }
                    aoi.set_stat(&layer.name, "status", StatValue::unavailable(reason));
                }
            }
        }
        aoi
    }
}
