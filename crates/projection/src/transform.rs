//! Point and geometry transforms between the supported CRS codes.
//!
//! Every transform goes through geographic coordinates: source CRS to
//! lon/lat, then lon/lat to target CRS. EPSG:4269 is treated as EPSG:4326
//! (the datum shift is well below grid resolution).

use crate::{mercator, AlbersEqualArea};
use geo::{coord, MapCoords, MultiPolygon};
use pipecast_common::{BoundingBox, CrsCode, PipecastError};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ProjectionError {
    #[error("Non-finite coordinate ({x}, {y}) in {crs}")]
    NonFinite { x: f64, y: f64, crs: CrsCode },

    #[error("Latitude {lat} outside [-90, 90] in {crs}")]
    LatitudeOutOfRange { lat: f64, crs: CrsCode },
}

impl From<ProjectionError> for PipecastError {
    fn from(err: ProjectionError) -> Self {
        PipecastError::Projection(err.to_string())
    }
}

/// A transform from one CRS to another.
#[derive(Debug, Clone)]
pub struct CrsTransform {
    from: CrsCode,
    to: CrsCode,
    albers: AlbersEqualArea,
}

impl CrsTransform {
    pub fn new(from: CrsCode, to: CrsCode) -> Self {
        Self {
            from,
            to,
            albers: AlbersEqualArea::conus(),
        }
    }

    pub fn from_crs(&self) -> CrsCode {
        self.from
    }

    pub fn to_crs(&self) -> CrsCode {
        self.to
    }

    /// True when the transform leaves coordinates unchanged.
    pub fn is_identity(&self) -> bool {
        self.from == self.to || (self.from.is_geographic() && self.to.is_geographic())
    }

    /// Transform a single point.
    pub fn transform_point(&self, x: f64, y: f64) -> Result<(f64, f64), ProjectionError> {
        if !x.is_finite() || !y.is_finite() {
            return Err(ProjectionError::NonFinite {
                x,
                y,
                crs: self.from,
            });
        }
        if self.is_identity() {
            return Ok((x, y));
        }

        let (lon, lat) = self.to_geographic(x, y)?;
        self.from_geographic(lon, lat)
    }

    fn to_geographic(&self, x: f64, y: f64) -> Result<(f64, f64), ProjectionError> {
        let (lon, lat) = match self.from {
            CrsCode::Epsg4326 | CrsCode::Epsg4269 => (x, y),
            CrsCode::Epsg3857 => mercator::inverse(x, y),
            CrsCode::Epsg5070 => self.albers.inverse(x, y),
        };
        if !(-90.0..=90.0).contains(&lat) {
            return Err(ProjectionError::LatitudeOutOfRange {
                lat,
                crs: self.from,
            });
        }
        Ok((lon, lat))
    }

    fn from_geographic(&self, lon: f64, lat: f64) -> Result<(f64, f64), ProjectionError> {
        let (x, y) = match self.to {
            CrsCode::Epsg4326 | CrsCode::Epsg4269 => (lon, lat),
            CrsCode::Epsg3857 => mercator::forward(lon, lat),
            CrsCode::Epsg5070 => self.albers.forward(lon, lat),
        };
        if !x.is_finite() || !y.is_finite() {
            return Err(ProjectionError::NonFinite { x, y, crs: self.to });
        }
        Ok((x, y))
    }
}

/// Reproject every coordinate of a multipolygon.
pub fn reproject_multipolygon(
    geometry: &MultiPolygon<f64>,
    from: CrsCode,
    to: CrsCode,
) -> Result<MultiPolygon<f64>, ProjectionError> {
    let transform = CrsTransform::new(from, to);
    if transform.is_identity() {
        return Ok(geometry.clone());
    }
    geometry.try_map_coords(|c| {
        transform
            .transform_point(c.x, c.y)
            .map(|(x, y)| coord! { x: x, y: y })
    })
}

/// Reproject a bounding box by sampling its edges.
///
/// Projected edges are curved, so the corners alone may underestimate the
/// extent.
pub fn reproject_bbox(
    bbox: &BoundingBox,
    from: CrsCode,
    to: CrsCode,
) -> Result<BoundingBox, ProjectionError> {
    let transform = CrsTransform::new(from, to);
    if transform.is_identity() {
        return Ok(*bbox);
    }

    const STEPS: usize = 10;
    let mut out: Option<BoundingBox> = None;
    for i in 0..=STEPS {
        let t = i as f64 / STEPS as f64;
        let x = bbox.min_x + t * bbox.width();
        let y = bbox.min_y + t * bbox.height();
        for (px, py) in [
            (x, bbox.min_y),
            (x, bbox.max_y),
            (bbox.min_x, y),
            (bbox.max_x, y),
        ] {
            let (tx, ty) = transform.transform_point(px, py)?;
            let point = BoundingBox::new(tx, ty, tx, ty);
            out = Some(match out {
                Some(b) => b.union(&point),
                None => point,
            });
        }
    }
    Ok(out.unwrap_or(*bbox))
}
