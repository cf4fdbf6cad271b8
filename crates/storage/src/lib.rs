//! Grid sources and output sinks for the pipecast pipeline.
//!
//! Inputs:
//! - [`GridSource`] implementations: ESRI ASCII grids on disk and an
//!   in-memory map for tests
//!
//! Outputs (one file per key, laid out by [`OutputLayout`]):
//! - AOI sets as GeoJSON FeatureCollections with a `crs` member
//! - Probability rasters as ESRI ASCII grids with a `.prj` sidecar
//! - Ranked AOI lists as CSV
//! - The run manifest as JSON

pub mod aoi_geojson;
pub mod ascii_grid;
pub mod grid_source;
pub mod layout;
pub mod manifest;
pub mod ranked_csv;

pub use aoi_geojson::{aoi_feature_collection, write_aoi_geojson};
pub use ascii_grid::{format_ascii_grid, parse_ascii_grid, read_ascii_grid, write_ascii_grid};
pub use grid_source::{GridSource, InMemoryGridSource, LocalGridSource};
pub use layout::OutputLayout;
pub use manifest::{
    ArtifactEntry, ArtifactKind, EnsembleEntry, ExcludedMember, FailureEntry, RunManifest,
    TupleStats,
};
pub use ranked_csv::{format_ranked_csv, write_ranked_csv, RANKED_CSV_COLUMNS};

use pipecast_common::PipecastResult;
use std::path::Path;
use tokio::fs;

/// Write `bytes` to `path` through a `.partial` file in the same directory,
/// creating parent directories as needed.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> PipecastResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!("{}.partial", file_name));

    fs::write(&temp, bytes).await?;
    if fs::rename(&temp, path).await.is_err() {
        fs::copy(&temp, path).await?;
        fs::remove_file(&temp).await?;
    }
    Ok(())
}
