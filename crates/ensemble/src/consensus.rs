//! Regions where enough members agree.

use crate::aggregate::ProbabilityRaster;
use aoi_extractor::AoiExtractor;
use pipecast_common::{Aoi, PipecastError, PipecastResult};
use tracing::debug;

/// Extract polygons from a probability raster where at least
/// `min_probability` of the members agree.
///
/// The raster is treated as a field and run through the AOI extractor, so
/// the same connectivity and tracing rules apply. Returned AOIs carry the
/// raster's bin label and ids `consensus_<bin>_<n>`; their `mean_value` and
/// `max_value` are probabilities.
pub fn consensus_regions(
    raster: &ProbabilityRaster,
    min_probability: f64,
    min_area: f64,
) -> PipecastResult<Vec<Aoi>> {
    if !(min_probability > 0.0 && min_probability <= 1.0) {
        return Err(PipecastError::invalid_threshold(format!(
            "consensus probability must be in (0, 1], got {}",
            min_probability
        )));
    }

    let field = raster.to_field()?;
    // f32 storage rounds 2/3 below the f64 value
    let threshold = min_probability - 1e-6;
    let aois = AoiExtractor::default().extract(&field, threshold, min_area, None)?;

    debug!(bin = raster.bin(), min_probability, regions = aois.len(), "Consensus regions");
    Ok(aois
        .into_iter()
        .enumerate()
        .map(|(i, mut aoi)| {
            aoi.id = format!("consensus_{}_{}", raster.bin(), i);
            aoi.threshold = min_probability;
            aoi.bin = Some(raster.bin().to_string());
            aoi
        })
        .collect())
}
