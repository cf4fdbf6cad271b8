//! The AOI extractor: field + threshold in, polygons with statistics out.

use crate::clip::clip_to_boundary;
use crate::label::{label_components, row_major, Component};
use crate::trace::{trace_component, IndexPolygon, Ring};
use crate::ExceedanceMask;
use geo::{coord, Area, LineString, MultiPolygon, Polygon, SimplifyVwPreserve};
use pipecast_common::{
    cell_center_coverage, Aoi, AoiStats, Field, GeoTransform, PipecastError, PipecastResult,
};
use rayon::prelude::*;
use tracing::{debug, instrument};

/// Extraction parameters that stay fixed for a run.
#[derive(Debug, Clone, Default)]
pub struct ExtractorConfig {
    /// Topology-preserving Visvalingam-Whyatt tolerance (triangle area in
    /// CRS units squared). `None` or zero keeps the exact cell outline.
    pub simplify_tolerance: Option<f64>,
}

/// Connected-region extractor.
#[derive(Debug, Clone, Default)]
pub struct AoiExtractor {
    config: ExtractorConfig,
}

impl AoiExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract the regions of `field` where `value >= threshold`.
    ///
    /// Components with area below `min_area` (CRS units squared) are
    /// dropped. When `land_boundary` is given, each region is intersected
    /// with it and dropped if its residual area is zero or below
    /// `min_area`. The returned AOIs are ordered by their first cell in
    /// row-major order and carry provisional ids `aoi-<n>`.
    #[instrument(skip(self, field, land_boundary), fields(width = field.width(), height = field.height()))]
    pub fn extract(
        &self,
        field: &Field,
        threshold: f64,
        min_area: f64,
        land_boundary: Option<&MultiPolygon<f64>>,
    ) -> PipecastResult<Vec<Aoi>> {
        let mask = ExceedanceMask::build(field, threshold)?;
        let seeds = row_major(&mask);
        self.extract_masked(field, &mask, threshold, min_area, land_boundary, seeds)
    }

    /// Like [`extract`](Self::extract) but visiting cells in the given seed
    /// order. The result is the same for every order.
    pub fn extract_with_seed_order(
        &self,
        field: &Field,
        threshold: f64,
        min_area: f64,
        land_boundary: Option<&MultiPolygon<f64>>,
        seeds: &[usize],
    ) -> PipecastResult<Vec<Aoi>> {
        let mask = ExceedanceMask::build(field, threshold)?;
        self.extract_masked(
            field,
            &mask,
            threshold,
            min_area,
            land_boundary,
            seeds.iter().copied(),
        )
    }

    fn extract_masked(
        &self,
        field: &Field,
        mask: &ExceedanceMask,
        threshold: f64,
        min_area: f64,
        land_boundary: Option<&MultiPolygon<f64>>,
        seeds: impl IntoIterator<Item = usize>,
    ) -> PipecastResult<Vec<Aoi>> {
        if !min_area.is_finite() || min_area < 0.0 {
            return Err(PipecastError::Config(format!(
                "min_area must be finite and non-negative, got {}",
                min_area
            )));
        }
        if mask.is_empty() {
            debug!(threshold, "no cells meet threshold");
            return Ok(Vec::new());
        }

        let (components, labels) = label_components(mask, seeds);
        debug!(threshold, components = components.len(), "labeled components");

        let regions: Vec<Region> = components
            .par_iter()
            .filter_map(|component| {
                self.build_region(field, component, &labels, min_area, land_boundary)
            })
            .collect();

        let aois = regions
            .into_iter()
            .enumerate()
            .map(|(i, region)| Aoi {
                id: format!("aoi-{}", i),
                origin: None,
                threshold,
                bin: None,
                crs: field.crs(),
                geometry: region.geometry,
                area: region.area,
                cell_count: region.cell_count,
                mean_value: region.mean_value,
                max_value: region.max_value,
                stats: AoiStats::new(),
            })
            .collect::<Vec<_>>();

        debug!(threshold, aois = aois.len(), "extraction complete");
        Ok(aois)
    }

    fn build_region(
        &self,
        field: &Field,
        component: &Component,
        labels: &[u32],
        min_area: f64,
        land_boundary: Option<&MultiPolygon<f64>>,
    ) -> Option<Region> {
        let polygons = trace_component(component, labels, field.width(), field.height());
        let mut geometry = to_world(&polygons, field.transform());

        if let Some(tolerance) = self.config.simplify_tolerance.filter(|t| *t > 0.0) {
            geometry = geometry.simplify_vw_preserve(&tolerance);
        }

        let area = geometry.unsigned_area();
        if area < min_area {
            debug!(anchor = component.anchor(), area, min_area, "component below min_area");
            return None;
        }

        let (geometry, area, stats) = match land_boundary {
            Some(land) => {
                let clipped = clip_to_boundary(&geometry, land, min_area)?;
                let area = clipped.unsigned_area();
                let inside = cell_center_coverage(
                    &clipped,
                    field.transform(),
                    field.width(),
                    field.height(),
                );
                // A sliver covering no cell center keeps the component's values
                let stats = cell_stats(
                    field,
                    component.cells.iter().copied().filter(|&i| inside.cells()[i]),
                )
                .or_else(|| cell_stats(field, component.cells.iter().copied()));
                (clipped, area, stats)
            }
            None => {
                let stats = cell_stats(field, component.cells.iter().copied());
                (geometry, area, stats)
            }
        };
        let stats = stats?;

        Some(Region {
            geometry,
            area,
            cell_count: stats.count,
            mean_value: stats.mean,
            max_value: stats.max,
        })
    }
}

/// Field values over a set of cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CellStats {
    pub count: usize,
    pub mean: f64,
    pub max: f64,
}

/// Count, mean and max of the finite field values at row-major `cells`;
/// `None` when there are none.
pub(crate) fn cell_stats(
    field: &Field,
    cells: impl IntoIterator<Item = usize>,
) -> Option<CellStats> {
    let (count, sum, max) = cells
        .into_iter()
        .filter_map(|i| field.data().get(i).copied())
        .filter(|v| v.is_finite())
        .fold((0usize, 0.0f64, f64::NEG_INFINITY), |(n, s, m), v| {
            (n + 1, s + f64::from(v), m.max(f64::from(v)))
        });
    (count > 0).then(|| CellStats {
        count,
        mean: sum / count as f64,
        max,
    })
}

struct Region {
    geometry: MultiPolygon<f64>,
    area: f64,
    cell_count: usize,
    mean_value: f64,
    max_value: f64,
}

fn to_world(polygons: &[IndexPolygon], transform: &GeoTransform) -> MultiPolygon<f64> {
    let ring_to_world = |ring: &Ring| -> LineString<f64> {
        let coords = ring
            .iter()
            .map(|&(x, y)| {
                let (wx, wy) = transform.apply(x as f64, y as f64);
                coord! { x: wx, y: wy }
            })
            .collect::<Vec<_>>();
        // Polygon::new closes the ring
        LineString::new(coords)
    };

    MultiPolygon(
        polygons
            .iter()
            .map(|p| {
                Polygon::new(
                    ring_to_world(&p.exterior),
                    p.holes.iter().map(ring_to_world).collect(),
                )
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use pipecast_common::CrsCode;

    fn field(width: usize, height: usize, f: impl Fn(usize, usize) -> f32) -> Field {
        let data = (0..height)
            .flat_map(|r| (0..width).map(move |c| (c, r)))
            .map(|(c, r)| f(c, r))
            .collect();
        Field::new(
            data,
            width,
            height,
            GeoTransform::new(0.0, height as f64, 1.0, -1.0),
            CrsCode::Epsg4326,
        )
        .unwrap()
    }

    #[test]
    fn test_block_gives_one_aoi_of_nine_cells() {
        let f = field(10, 10, |c, r| {
            if (2..=4).contains(&c) && (2..=4).contains(&r) {
                50.0
            } else {
                0.0
            }
        });
        let aois = AoiExtractor::default().extract(&f, 39.0, 0.0, None).unwrap();
        assert_eq!(aois.len(), 1);
        assert!((aois[0].area - 9.0).abs() < 1e-9);
        assert_eq!(aois[0].cell_count, 9);
        assert_eq!(aois[0].mean_value, 50.0);
        assert_eq!(aois[0].max_value, 50.0);
    }

    #[test]
    fn test_min_area_filters_small_components() {
        let f = field(6, 6, |c, r| if (c, r) == (0, 0) || (c >= 3 && r >= 3) { 10.0 } else { 0.0 });
        let all = AoiExtractor::default().extract(&f, 5.0, 0.0, None).unwrap();
        assert_eq!(all.len(), 2);
        let big = AoiExtractor::default().extract(&f, 5.0, 2.0, None).unwrap();
        assert_eq!(big.len(), 1);
        assert_eq!(big[0].cell_count, 9);
        // A single cell exactly at min_area survives
        let single = AoiExtractor::default().extract(&f, 5.0, 1.0, None).unwrap();
        assert_eq!(single.len(), 2);
    }

    #[test]
    fn test_land_clip_reduces_area() {
        let f = field(4, 4, |_, _| 10.0);
        let land = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 4.0),
            (x: 0.0, y: 4.0),
        ]]);
        let aois = AoiExtractor::default().extract(&f, 1.0, 0.0, Some(&land)).unwrap();
        assert_eq!(aois.len(), 1);
        assert!((aois[0].area - 8.0).abs() < 1e-9);
        assert_eq!(aois[0].cell_count, 8);
    }

    #[test]
    fn test_land_clip_stats_cover_only_kept_cells() {
        // Left half 10, right half 30
        let f = field(4, 4, |c, _| if c < 2 { 10.0 } else { 30.0 });
        let land = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 3.0, y: 0.0),
            (x: 3.0, y: 4.0),
            (x: 0.0, y: 4.0),
        ]]);
        let aois = AoiExtractor::default().extract(&f, 1.0, 0.0, Some(&land)).unwrap();
        assert_eq!(aois.len(), 1);
        assert_eq!(aois[0].cell_count, 12);
        assert!((aois[0].mean_value - 50.0 / 3.0).abs() < 1e-9);
        assert_eq!(aois[0].max_value, 30.0);
    }

    #[test]
    fn test_cell_stats_skips_missing_values() {
        let f = field(3, 1, |c, _| [2.0, f32::NAN, 4.0][c]);
        let stats = cell_stats(&f, 0..3).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean, 3.0);
        assert_eq!(stats.max, 4.0);
        assert!(cell_stats(&f, std::iter::once(1)).is_none());
    }

    #[test]
    fn test_simplification_keeps_block_shape() {
        let f = field(5, 5, |c, r| if (1..4).contains(&c) && (1..4).contains(&r) { 1.0 } else { 0.0 });
        let extractor = AoiExtractor::new(ExtractorConfig {
            simplify_tolerance: Some(0.1),
        });
        let aois = extractor.extract(&f, 1.0, 0.0, None).unwrap();
        assert_eq!(aois.len(), 1);
        assert!((aois[0].area - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_negative_min_area() {
        let f = field(2, 2, |_, _| 1.0);
        let err = AoiExtractor::default().extract(&f, 0.5, -1.0, None).unwrap_err();
        assert!(matches!(err, PipecastError::Config(_)));
    }
}
