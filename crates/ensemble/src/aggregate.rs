//! Per-cell exceedance probability across ensemble members.

use crate::member::{EnsembleMember, MemberOutcome, MissingMemberPolicy};
use geo::MultiPolygon;
use pipecast_common::{
    cell_center_coverage, AnalysisGrid, Aoi, CoverageMask, Field, MemberId, PipecastError,
    PipecastResult, ThresholdBin,
};
use projection::reproject_multipolygon;
use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

/// Probability of exceedance for one bin over the analysis grid.
///
/// `values[i]` is the share of effective members whose AOIs cover cell `i`,
/// always within `[0, 1]`.
#[derive(Debug, Clone)]
pub struct ProbabilityRaster {
    bin: String,
    grid: AnalysisGrid,
    values: Vec<f64>,
    /// Every member that was attempted
    pub attempted: Vec<MemberId>,
    /// Members counted in the denominator
    pub effective: Vec<MemberId>,
    /// Failed members left out of the denominator, with the reason
    pub excluded: Vec<(MemberId, String)>,
}

impl ProbabilityRaster {
    pub fn bin(&self) -> &str {
        &self.bin
    }

    pub fn grid(&self) -> &AnalysisGrid {
        &self.grid
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, col: usize, row: usize) -> Option<f64> {
        if col < self.grid.width && row < self.grid.height {
            Some(self.values[row * self.grid.width + col])
        } else {
            None
        }
    }

    /// Value of the cell containing `(x, y)`, in grid CRS units.
    pub fn value_at(&self, x: f64, y: f64) -> Option<f64> {
        self.grid.cell_index_at(x, y).map(|i| self.values[i])
    }

    pub fn max_value(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }

    /// Mean value over the cells covered by `mask`, `None` when it covers
    /// no cell.
    pub fn mean_over(&self, mask: &CoverageMask) -> Option<f64> {
        let (sum, n) = mask
            .covered_indices()
            .fold((0.0, 0usize), |(s, n), i| (s + self.values[i], n + 1));
        (n > 0).then(|| sum / n as f64)
    }

    /// The raster as a [`Field`] on the analysis grid.
    pub fn to_field(&self) -> PipecastResult<Field> {
        Field::new(
            self.values.iter().map(|&v| v as f32).collect(),
            self.grid.width,
            self.grid.height,
            self.grid.transform(),
            self.grid.crs,
        )
    }
}

/// Combines member AOI sets into probability rasters.
#[derive(Debug, Clone, Default)]
pub struct EnsembleAggregator {
    policy: MissingMemberPolicy,
}

impl EnsembleAggregator {
    pub fn new(policy: MissingMemberPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> MissingMemberPolicy {
        self.policy
    }

    /// Aggregate `members` for `bin` onto `grid`.
    ///
    /// Each succeeded member is rasterized with the cell-center rule and
    /// counted once per cell. A member whose AOIs cannot be brought into the
    /// grid CRS is treated as failed.
    #[instrument(skip_all, fields(bin = %bin.label, members = members.len()))]
    pub fn aggregate(
        &self,
        members: &[EnsembleMember],
        bin: &ThresholdBin,
        grid: &AnalysisGrid,
    ) -> PipecastResult<ProbabilityRaster> {
        if members.is_empty() {
            return Err(PipecastError::aggregation(&bin.label, "no members attempted"));
        }

        let rasterized: Vec<(MemberId, Result<CoverageMask, String>)> = members
            .par_iter()
            .map(|m| {
                let coverage = match &m.outcome {
                    MemberOutcome::Succeeded(aois) => member_coverage(aois, grid),
                    MemberOutcome::Failed(reason) => Err(reason.clone()),
                };
                (m.member.clone(), coverage)
            })
            .collect();

        let attempted: Vec<MemberId> = rasterized.iter().map(|(m, _)| m.clone()).collect();
        let mut counts = vec![0u32; grid.len()];
        let mut effective = Vec::new();
        let mut excluded = Vec::new();
        let mut succeeded = 0usize;

        for (member, coverage) in rasterized {
            match coverage {
                Ok(mask) => {
                    for i in mask.covered_indices() {
                        counts[i] += 1;
                    }
                    succeeded += 1;
                    effective.push(member);
                }
                Err(reason) => match self.policy {
                    MissingMemberPolicy::Exclude => {
                        warn!(member = %member, %reason, "Member excluded from ensemble");
                        excluded.push((member, reason));
                    }
                    MissingMemberPolicy::CountAsZero => {
                        warn!(member = %member, %reason, "Failed member counted as zero coverage");
                        effective.push(member);
                    }
                },
            }
        }

        // Under either policy a bin with no succeeded member has no data
        if succeeded == 0 {
            return Err(PipecastError::aggregation(
                &bin.label,
                format!("all {} attempted members failed", attempted.len()),
            ));
        }

        let n = effective.len() as f64;
        let values: Vec<f64> = counts
            .iter()
            .map(|&c| if c == 0 { 0.0 } else { c as f64 / n })
            .collect();

        info!(
            attempted = attempted.len(),
            effective = effective.len(),
            excluded = excluded.len(),
            "Probability raster aggregated"
        );

        Ok(ProbabilityRaster {
            bin: bin.label.clone(),
            grid: grid.clone(),
            values,
            attempted,
            effective,
            excluded,
        })
    }
}

/// Cells covered by any of a member's AOIs.
fn member_coverage(aois: &[Aoi], grid: &AnalysisGrid) -> Result<CoverageMask, String> {
    let transform = grid.transform();
    let mut mask = CoverageMask::empty(grid.width, grid.height);
    for aoi in aois {
        let geometry: MultiPolygon<f64> = reproject_multipolygon(&aoi.geometry, aoi.crs, grid.crs)
            .map_err(|e| format!("AOI {} not representable in {}: {}", aoi.id, grid.crs, e))?;
        mask.union_with(&cell_center_coverage(
            &geometry,
            &transform,
            grid.width,
            grid.height,
        ));
    }
    debug!(aois = aois.len(), cells = mask.count(), "Member rasterized");
    Ok(mask)
}
