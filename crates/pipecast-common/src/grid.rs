//! Gridded fields and grid geometry.
//!
//! All grids are stored row-major with row 0 at the top (north for north-up
//! grids). A [`GeoTransform`] maps fractional (col, row) index coordinates,
//! measured from the top-left corner of the top-left cell, to CRS
//! coordinates.

use crate::{BoundingBox, CrsCode, PipecastError, PipecastResult};
use serde::{Deserialize, Serialize};

/// Affine transform without rotation terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the top-left corner of the top-left cell
    pub origin_x: f64,
    /// Y coordinate of the top-left corner of the top-left cell
    pub origin_y: f64,
    /// Cell size along columns (positive for west-to-east)
    pub pixel_width: f64,
    /// Cell size along rows (negative for north-up grids)
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// North-up transform covering `(west, south, east, north)` with the
    /// given grid shape.
    ///
    /// Longitudes in the 0-360 convention (> 180) are shifted to -180..180
    /// first, so grids such as HRRR's line up with geographic layers.
    pub fn from_bounds(
        west: f64,
        south: f64,
        east: f64,
        north: f64,
        width: usize,
        height: usize,
    ) -> Self {
        let west = normalize_longitude(west);
        let east = normalize_longitude(east);
        Self {
            origin_x: west,
            origin_y: north,
            pixel_width: (east - west) / width.max(1) as f64,
            pixel_height: -(north - south) / height.max(1) as f64,
        }
    }

    /// Map fractional index coordinates to CRS coordinates.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width,
            self.origin_y + row * self.pixel_height,
        )
    }

    /// CRS coordinates of a cell center.
    pub fn cell_center(&self, col: usize, row: usize) -> (f64, f64) {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Map CRS coordinates back to fractional index coordinates.
    pub fn invert(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    /// Area of a single cell in CRS units squared.
    pub fn cell_area(&self) -> f64 {
        (self.pixel_width * self.pixel_height).abs()
    }

    /// Extent of a `width` x `height` grid using this transform.
    pub fn bounds(&self, width: usize, height: usize) -> BoundingBox {
        let (x0, y0) = self.apply(0.0, 0.0);
        let (x1, y1) = self.apply(width as f64, height as f64);
        BoundingBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }

    fn is_valid(&self) -> bool {
        self.origin_x.is_finite()
            && self.origin_y.is_finite()
            && self.pixel_width.is_finite()
            && self.pixel_height.is_finite()
            && self.pixel_width != 0.0
            && self.pixel_height != 0.0
    }
}

/// Shift a 0-360 longitude into the -180..180 range.
pub fn normalize_longitude(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else {
        lon
    }
}

/// A 2-D scalar field (precipitation accumulation) with georeferencing.
///
/// Produced by a grid source and never mutated afterwards. NaN cells are
/// treated as missing data.
#[derive(Debug, Clone)]
pub struct Field {
    data: Vec<f32>,
    width: usize,
    height: usize,
    transform: GeoTransform,
    crs: CrsCode,
}

impl Field {
    /// Create a field, checking that shape and transform are consistent.
    pub fn new(
        data: Vec<f32>,
        width: usize,
        height: usize,
        transform: GeoTransform,
        crs: CrsCode,
    ) -> PipecastResult<Self> {
        if width == 0 || height == 0 {
            return Err(PipecastError::invalid_grid(format!(
                "grid has zero extent ({}x{})",
                width, height
            )));
        }
        if data.len() != width * height {
            return Err(PipecastError::invalid_grid(format!(
                "data length {} does not match {}x{} grid",
                data.len(),
                width,
                height
            )));
        }
        if !transform.is_valid() {
            return Err(PipecastError::invalid_grid(format!(
                "degenerate transform {:?}",
                transform
            )));
        }

        Ok(Self {
            data,
            width,
            height,
            transform,
            crs,
        })
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> CrsCode {
        self.crs
    }

    /// Value at (col, row), if inside the grid.
    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.data.get(row * self.width + col).copied()
    }

    /// Number of finite (non-missing) cells.
    pub fn finite_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_finite()).count()
    }

    /// (min, max) over finite cells, or None if there are none.
    pub fn value_range(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Extent of the full grid footprint.
    pub fn bounds(&self) -> BoundingBox {
        self.transform.bounds(self.width, self.height)
    }
}

/// The fixed analysis grid shared by every probability raster of a run.
///
/// Cells are square with side `resolution`; the grid starts at the
/// top-left corner `(west, north)` and may extend slightly past `east` and
/// `south` when the extent is not a multiple of the resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisGrid {
    pub bounds: BoundingBox,
    pub resolution: f64,
    pub width: usize,
    pub height: usize,
    pub crs: CrsCode,
}

impl AnalysisGrid {
    pub fn new(bounds: BoundingBox, resolution: f64, crs: CrsCode) -> PipecastResult<Self> {
        if !bounds.is_valid() {
            return Err(PipecastError::Config(format!(
                "invalid analysis extent {:?}",
                bounds
            )));
        }
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(PipecastError::Config(format!(
                "analysis resolution must be positive, got {}",
                resolution
            )));
        }

        let width = (bounds.width() / resolution).ceil().max(1.0) as usize;
        let height = (bounds.height() / resolution).ceil().max(1.0) as usize;

        Ok(Self {
            bounds,
            resolution,
            width,
            height,
            crs,
        })
    }

    /// Grid covering `extent` padded by `padding`, with the corners snapped
    /// outward to multiples of the resolution.
    pub fn covering(
        extent: BoundingBox,
        resolution: f64,
        padding: f64,
        crs: CrsCode,
    ) -> PipecastResult<Self> {
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(PipecastError::Config(format!(
                "analysis resolution must be positive, got {}",
                resolution
            )));
        }
        let padded = extent.expand(padding.max(0.0));
        let snapped = BoundingBox::new(
            (padded.min_x / resolution).floor() * resolution,
            (padded.min_y / resolution).floor() * resolution,
            (padded.max_x / resolution).ceil() * resolution,
            (padded.max_y / resolution).ceil() * resolution,
        );
        Self::new(snapped, resolution, crs)
    }

    pub fn transform(&self) -> GeoTransform {
        GeoTransform::new(
            self.bounds.min_x,
            self.bounds.max_y,
            self.resolution,
            -self.resolution,
        )
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Flat row-major index of the cell containing (x, y), if inside.
    pub fn cell_index_at(&self, x: f64, y: f64) -> Option<usize> {
        let (col, row) = self.transform().invert(x, y);
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (col, row) = (col.floor() as usize, row.floor() as usize);
        if col >= self.width || row >= self.height {
            return None;
        }
        Some(row * self.width + col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_transform() -> GeoTransform {
        GeoTransform::new(0.0, 10.0, 1.0, -1.0)
    }

    #[test]
    fn test_transform_apply_and_invert() {
        let t = unit_transform();
        assert_eq!(t.apply(0.0, 0.0), (0.0, 10.0));
        assert_eq!(t.cell_center(2, 3), (2.5, 6.5));
        assert_eq!(t.invert(2.5, 6.5), (2.5, 3.5));
        assert_eq!(t.cell_area(), 1.0);
    }

    #[test]
    fn test_from_bounds_normalizes_longitude() {
        let t = GeoTransform::from_bounds(235.0, 20.0, 295.0, 50.0, 60, 30);
        assert_eq!(t.origin_x, -125.0);
        assert_eq!(t.origin_y, 50.0);
        assert!((t.pixel_width - 1.0).abs() < 1e-12);
        assert!((t.pixel_height + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_field_shape_validation() {
        let t = unit_transform();
        assert!(Field::new(vec![0.0; 10], 5, 2, t, CrsCode::Epsg4326).is_ok());
        assert!(Field::new(vec![0.0; 9], 5, 2, t, CrsCode::Epsg4326).is_err());
        assert!(Field::new(vec![], 0, 0, t, CrsCode::Epsg4326).is_err());
        let bad = GeoTransform::new(0.0, 0.0, 0.0, -1.0);
        assert!(Field::new(vec![0.0; 4], 2, 2, bad, CrsCode::Epsg4326).is_err());
    }

    #[test]
    fn test_field_value_range_skips_nan() {
        let field = Field::new(
            vec![f32::NAN, 3.0, -1.0, 7.5],
            2,
            2,
            unit_transform(),
            CrsCode::Epsg4326,
        )
        .unwrap();
        assert_eq!(field.finite_count(), 3);
        assert_eq!(field.value_range(), Some((-1.0, 7.5)));
        assert_eq!(field.get(1, 1), Some(7.5));
        assert_eq!(field.get(2, 0), None);
    }

    #[test]
    fn test_field_bounds() {
        let field =
            Field::new(vec![0.0; 50], 10, 5, unit_transform(), CrsCode::Epsg4326).unwrap();
        assert_eq!(field.bounds(), BoundingBox::new(0.0, 5.0, 10.0, 10.0));
    }

    #[test]
    fn test_analysis_grid_dimensions() {
        let grid = AnalysisGrid::new(
            BoundingBox::new(-100.0, 30.0, -99.0, 30.5),
            0.05,
            CrsCode::Epsg4326,
        )
        .unwrap();
        assert_eq!(grid.width, 20);
        assert_eq!(grid.height, 10);
        assert_eq!(grid.len(), 200);
        assert_eq!(grid.cell_index_at(-99.975, 30.475), Some(0));
        assert_eq!(grid.cell_index_at(-101.0, 30.2), None);
    }

    #[test]
    fn test_analysis_grid_covering_snaps_outward() {
        let grid = AnalysisGrid::covering(
            BoundingBox::new(0.3, 0.3, 1.6, 1.2),
            0.5,
            0.25,
            CrsCode::Epsg4326,
        )
        .unwrap();
        assert_eq!(grid.bounds, BoundingBox::new(0.0, 0.0, 2.0, 1.5));
        assert_eq!((grid.width, grid.height), (4, 3));
    }

    #[test]
    fn test_analysis_grid_rejects_bad_resolution() {
        let bounds = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert!(AnalysisGrid::new(bounds, 0.0, CrsCode::Epsg4326).is_err());
        assert!(AnalysisGrid::new(bounds, f64::NAN, CrsCode::Epsg4326).is_err());
    }
}
