//! Common types and utilities shared across the pipecast crates.
//!
//! Holds the data model of the pipeline (fields, thresholds, AOIs, analysis
//! grids), the cell-center coverage rasterizer used by both enrichment and
//! ensemble aggregation, and the error taxonomy.

pub mod aoi;
pub mod bbox;
pub mod coverage;
pub mod crs;
pub mod error;
pub mod grid;
pub mod threshold;
pub mod time;

pub use aoi::{Aoi, AoiOrigin, AoiStats, ProcessingMethod, StatValue};
pub use bbox::BoundingBox;
pub use coverage::{cell_center_coverage, CoverageMask};
pub use crs::{CrsCode, CrsParseError};
pub use error::{PipecastError, PipecastResult};
pub use grid::{AnalysisGrid, Field, GeoTransform};
pub use threshold::{BinSet, Threshold, ThresholdBin};
pub use time::{ForecastKey, MemberId};
