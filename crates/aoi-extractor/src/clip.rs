//! Clipping AOI geometry to a boundary (land mask, analysis area).

use crate::extractor::cell_stats;
use geo::{Area, BooleanOps, BoundingRect, MultiPolygon};
use pipecast_common::{cell_center_coverage, Aoi, BoundingBox, Field};
use tracing::debug;

/// Merge overlapping boundary polygons into one non-overlapping surface.
///
/// Intersection counts area the boundary covers twice as outside it, so
/// boundaries built from layer features are dissolved before clipping.
pub fn dissolve(boundary: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    let mut polygons = boundary.0.iter();
    let Some(first) = polygons.next() else {
        return MultiPolygon(Vec::new());
    };
    let dissolved = polygons.fold(MultiPolygon(vec![first.clone()]), |acc, p| {
        acc.union(&MultiPolygon(vec![p.clone()]))
    });
    debug!(
        input = boundary.0.len(),
        output = dissolved.0.len(),
        "Boundary dissolved"
    );
    dissolved
}

/// Intersect `geometry` with `boundary`. The boundary must not overlap
/// itself; see [`dissolve`].
///
/// Boundary polygons whose bounding box misses the geometry's are skipped
/// before the polygon intersection. Returns `None` when nothing is left or
/// the residual area is zero or below `min_area`.
pub fn clip_to_boundary(
    geometry: &MultiPolygon<f64>,
    boundary: &MultiPolygon<f64>,
    min_area: f64,
) -> Option<MultiPolygon<f64>> {
    let bbox = BoundingBox::from(geometry.bounding_rect()?);

    let candidates: Vec<_> = boundary
        .0
        .iter()
        .filter(|p| {
            p.bounding_rect()
                .map(|r| BoundingBox::from(r).intersects(&bbox))
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    if candidates.is_empty() {
        return None;
    }

    let clipped = geometry.intersection(&MultiPolygon(candidates));
    let area = clipped.unsigned_area();
    if clipped.0.is_empty() || area <= 0.0 || area < min_area {
        return None;
    }
    Some(clipped)
}

/// Clip every AOI extracted from `field` to `boundary`, dropping AOIs with
/// nothing (or too little) left.
///
/// Geometry and area are replaced, and the cell statistics are recomputed
/// over the exceeding cells whose centers stay inside the clipped geometry.
/// An AOI reduced to a sliver that covers no cell center keeps its values.
pub fn clip_aois(
    aois: Vec<Aoi>,
    boundary: &MultiPolygon<f64>,
    min_area: f64,
    field: &Field,
) -> Vec<Aoi> {
    aois.into_iter()
        .filter_map(|mut aoi| match clip_to_boundary(&aoi.geometry, boundary, min_area) {
            Some(clipped) => {
                let inside = cell_center_coverage(
                    &clipped,
                    field.transform(),
                    field.width(),
                    field.height(),
                );
                let threshold = aoi.threshold;
                let kept = inside.covered_indices().filter(|&i| {
                    field
                        .data()
                        .get(i)
                        .map_or(false, |&v| f64::from(v) >= threshold)
                });
                if let Some(stats) = cell_stats(field, kept) {
                    aoi.cell_count = stats.count;
                    aoi.mean_value = stats.mean;
                    aoi.max_value = stats.max;
                }
                aoi.area = clipped.unsigned_area();
                aoi.geometry = clipped;
                Some(aoi)
            }
            None => {
                debug!(aoi = %aoi.id, "AOI dropped by boundary clip");
                None
            }
        })
        .collect()
}
