//! Cell-center polygon rasterization.
//!
//! A cell is covered when its center lies inside a polygon. Inside-ness is
//! decided per scanline through the row's cell centers with a half-open
//! even-odd crossing test: an edge crosses the scanline when exactly one of
//! its endpoints lies strictly above it, and a center at `x` is inside a
//! crossing span `[x0, x1)`. The same rule is used everywhere a polygon is
//! turned into cells, so coverage is consistent across the pipeline.

use crate::GeoTransform;
use geo::{LineString, MultiPolygon, Polygon};

/// Binary per-cell coverage over a grid.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageMask {
    width: usize,
    height: usize,
    cells: Vec<bool>,
}

impl CoverageMask {
    pub fn empty(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![false; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    pub fn is_covered(&self, col: usize, row: usize) -> bool {
        col < self.width && row < self.height && self.cells[row * self.width + col]
    }

    /// Number of covered cells.
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    /// Flat row-major indices of covered cells.
    pub fn covered_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, &c)| if c { Some(i) } else { None })
    }

    /// Mark every cell covered in `other` (same shape).
    pub fn union_with(&mut self, other: &CoverageMask) {
        debug_assert_eq!(self.cells.len(), other.cells.len());
        for (a, &b) in self.cells.iter_mut().zip(other.cells.iter()) {
            *a |= b;
        }
    }
}

/// Rasterize `geometry` onto a `width` x `height` grid with `transform`.
///
/// Polygons are evaluated independently and OR-ed, so overlapping polygons
/// never cancel out.
pub fn cell_center_coverage(
    geometry: &MultiPolygon<f64>,
    transform: &GeoTransform,
    width: usize,
    height: usize,
) -> CoverageMask {
    let mut mask = CoverageMask::empty(width, height);
    for polygon in &geometry.0 {
        rasterize_polygon(polygon, transform, &mut mask);
    }
    mask
}

fn rasterize_polygon(polygon: &Polygon<f64>, transform: &GeoTransform, mask: &mut CoverageMask) {
    let rings: Vec<&LineString<f64>> = std::iter::once(polygon.exterior())
        .chain(polygon.interiors().iter())
        .collect();

    let Some((row_lo, row_hi)) = row_span(&rings, transform, mask.height) else {
        return;
    };

    let mut crossings: Vec<f64> = Vec::new();
    for row in row_lo..row_hi {
        let (_, y) = transform.cell_center(0, row);

        crossings.clear();
        for ring in &rings {
            for line in ring.lines() {
                let (a, b) = (line.start, line.end);
                if (a.y > y) != (b.y > y) {
                    crossings.push(a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y));
                }
            }
        }
        if crossings.len() < 2 {
            continue;
        }
        crossings.sort_by(|a, b| a.total_cmp(b));

        for span in crossings.chunks_exact(2) {
            let (c0, c1) = column_span(span[0], span[1], transform, mask.width);
            for col in c0..c1 {
                mask.cells[row * mask.width + col] = true;
            }
        }
    }
}

/// Rows whose center scanline can intersect the rings.
fn row_span(
    rings: &[&LineString<f64>],
    transform: &GeoTransform,
    height: usize,
) -> Option<(usize, usize)> {
    let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
    for coord in rings.iter().flat_map(|r| r.coords()) {
        let (_, row) = transform.invert(coord.x, coord.y);
        lo = lo.min(row);
        hi = hi.max(row);
    }
    if !lo.is_finite() || !hi.is_finite() {
        return None;
    }
    let first = (lo - 0.5).floor().max(0.0) as usize;
    let last = ((hi - 0.5).ceil() + 1.0).clamp(0.0, height as f64) as usize;
    if first >= last {
        None
    } else {
        Some((first, last))
    }
}

/// Columns whose centers fall in `[x0, x1)`.
fn column_span(x0: f64, x1: f64, transform: &GeoTransform, width: usize) -> (usize, usize) {
    let (f0, _) = transform.invert(x0, transform.origin_y);
    let (f1, _) = transform.invert(x1, transform.origin_y);
    let (lo, hi) = if f0 <= f1 { (f0, f1) } else { (f1, f0) };
    let start = (lo - 0.5).ceil().clamp(0.0, width as f64) as usize;
    let end = (hi - 0.5).ceil().clamp(0.0, width as f64) as usize;
    (start, end.max(start))
}
