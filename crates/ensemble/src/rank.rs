//! Population-weighted risk ranking of AOIs.

use crate::aggregate::ProbabilityRaster;
use enrichment::EnrichmentLayer;
use pipecast_common::{cell_center_coverage, Aoi};
use projection::reproject_multipolygon;
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Where `population_affected` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PopulationSource {
    /// An enrichment statistic already on the AOI
    Enrichment,
    /// Computed against the population layer during ranking
    Layer,
    /// No population available; the AOI area stands in
    AreaFallback,
}

impl PopulationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PopulationSource::Enrichment => "enrichment",
            PopulationSource::Layer => "layer",
            PopulationSource::AreaFallback => "area_fallback",
        }
    }
}

/// An AOI with its risk score and 1-based rank.
#[derive(Debug, Clone)]
pub struct RankedAoi {
    pub rank: usize,
    pub aoi: Aoi,
    pub ensemble_probability: f64,
    pub population_affected: f64,
    pub population_source: PopulationSource,
    pub score: f64,
}

impl RankedAoi {
    pub fn area_fallback(&self) -> bool {
        self.population_source == PopulationSource::AreaFallback
    }
}

/// Scores AOIs by `ensemble_probability × population_affected` and keeps
/// the `top_n` highest.
#[derive(Debug, Clone)]
pub struct RiskRanker {
    top_n: usize,
}

impl RiskRanker {
    pub fn new(top_n: usize) -> Self {
        Self { top_n }
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// Rank `aois` against the probability rasters keyed by bin label.
    ///
    /// Output is ordered by score (descending), then population
    /// (descending), then area (descending), then AOI id.
    pub fn rank(
        &self,
        aois: Vec<Aoi>,
        probability_by_bin: &HashMap<String, ProbabilityRaster>,
        population_layer: Option<&EnrichmentLayer>,
    ) -> Vec<RankedAoi> {
        let mut scored: Vec<RankedAoi> = aois
            .into_par_iter()
            .map(|aoi| {
                let probability = aoi
                    .bin
                    .as_deref()
                    .and_then(|bin| probability_by_bin.get(bin))
                    .map(|raster| ensemble_probability(&aoi, raster))
                    .unwrap_or(0.0);
                let (population, source) = population_affected(&aoi, population_layer);
                RankedAoi {
                    rank: 0,
                    ensemble_probability: probability,
                    population_affected: population,
                    population_source: source,
                    score: probability * population,
                    aoi,
                }
            })
            .collect();

        scored.sort_by(compare);
        scored.truncate(self.top_n);
        for (i, ranked) in scored.iter_mut().enumerate() {
            ranked.rank = i + 1;
        }
        debug!(ranked = scored.len(), top_n = self.top_n, "AOIs ranked");
        scored
    }
}

fn compare(a: &RankedAoi, b: &RankedAoi) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.population_affected.total_cmp(&a.population_affected))
        .then_with(|| b.aoi.area.total_cmp(&a.aoi.area))
        .then_with(|| a.aoi.id.cmp(&b.aoi.id))
}

/// Mean raster value over the cells whose centers fall inside the AOI.
///
/// An AOI smaller than a cell may cover no center; the cell holding its
/// bounding-box center is used instead, and 0 when that is off the grid.
fn ensemble_probability(aoi: &Aoi, raster: &ProbabilityRaster) -> f64 {
    let grid = raster.grid();
    let geometry = match reproject_multipolygon(&aoi.geometry, aoi.crs, grid.crs) {
        Ok(g) => g,
        Err(e) => {
            warn!(aoi = %aoi.id, error = %e, "AOI cannot be placed on the analysis grid");
            return 0.0;
        }
    };

    let mask = cell_center_coverage(&geometry, &grid.transform(), grid.width, grid.height);
    if let Some(mean) = raster.mean_over(&mask) {
        return mean;
    }

    pipecast_common::BoundingBox::of_geometry(&geometry)
        .and_then(|bbox| {
            let (x, y) = bbox.center();
            raster.value_at(x, y)
        })
        .unwrap_or(0.0)
}

fn population_affected(aoi: &Aoi, layer: Option<&EnrichmentLayer>) -> (f64, PopulationSource) {
    if let Some(population) = aoi.population() {
        return (population, PopulationSource::Enrichment);
    }
    if let Some(population) = layer.and_then(|l| l.population_within(&aoi.geometry, aoi.crs)) {
        return (population, PopulationSource::Layer);
    }
    (aoi.area, PopulationSource::AreaFallback)
}
