//! Coordinate reference system transformations.
//!
//! Implements the handful of projections the pipeline meets in practice
//! (geographic, Web Mercator, CONUS Albers) from their closed-form
//! equations, plus geometry reprojection built on top of them.

pub mod albers;
pub mod mercator;
pub mod transform;

pub use albers::AlbersEqualArea;
pub use transform::{reproject_bbox, reproject_multipolygon, CrsTransform, ProjectionError};
