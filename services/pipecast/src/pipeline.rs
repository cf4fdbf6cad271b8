//! Batch orchestration.
//!
//! Every (date, hour, member) tuple is fetched once and extracted for every
//! threshold and method, with the CPU work on the blocking pool and at most
//! `max_concurrent_tuples` tuples in flight. Once all tuples are done, each
//! (date, hour) gets one probability raster per bin and a ranked AOI list.
//! Failures are recorded in the manifest and never stop the batch.

use crate::config::{AnalysisArea, PipelineConfig};
use crate::layers::build_registry;
use anyhow::Context;
use aoi_extractor::clip::{clip_aois, dissolve};
use aoi_extractor::{AoiExtractor, ExtractorConfig};
use chrono::NaiveDate;
use enrichment::{EnrichmentLayer, LayerCache, LayerEnricher, LayerRegistry, LayerState, LoadedLayer};
use ensemble::{
    consensus_regions, EnsembleAggregator, EnsembleMember, MemberOutcome, ProbabilityRaster,
    RiskRanker,
};
use futures::stream::{self, StreamExt};
use geo::{MultiPolygon, Rect};
use pipecast_common::time::hour_label;
use pipecast_common::{
    AnalysisGrid, Aoi, AoiOrigin, BinSet, BoundingBox, CrsCode, Field, ForecastKey, PipecastError,
    PipecastResult, ProcessingMethod, Threshold, ThresholdBin,
};
use projection::{reproject_bbox, reproject_multipolygon};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use storage::{
    write_aoi_geojson, write_ascii_grid, write_ranked_csv, ArtifactEntry, ArtifactKind,
    EnsembleEntry, GridSource, LocalGridSource, OutputLayout, RunManifest, TupleStats,
};
use tracing::{debug, error, info, instrument, warn};

/// AOIs of one tuple for one method and threshold.
#[derive(Debug, Clone)]
pub struct AoiSet {
    pub method: ProcessingMethod,
    pub threshold: Threshold,
    pub aois: Vec<Aoi>,
}

/// What a run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub manifest: RunManifest,
    pub tuples: usize,
    pub failed_tuples: usize,
    pub rasters: usize,
    pub ranked: usize,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.manifest.has_failures()
    }
}

/// A boundary AOIs are clipped to.
#[derive(Debug, Clone)]
struct ClipBoundary {
    geometry: MultiPolygon<f64>,
    crs: CrsCode,
}

impl ClipBoundary {
    fn in_crs(&self, crs: CrsCode) -> PipecastResult<Cow<'_, MultiPolygon<f64>>> {
        if crs == self.crs {
            Ok(Cow::Borrowed(&self.geometry))
        } else {
            Ok(Cow::Owned(reproject_multipolygon(&self.geometry, self.crs, crs)?))
        }
    }
}

#[derive(Debug, Default)]
struct Boundaries {
    land: Option<ClipBoundary>,
    area: Option<ClipBoundary>,
}

struct TupleOutcome {
    key: ForecastKey,
    result: PipecastResult<Vec<AoiSet>>,
    artifacts: Vec<ArtifactEntry>,
    stats: Vec<TupleStats>,
    failures: Vec<(String, PipecastError)>,
}

impl TupleOutcome {
    fn failed(key: ForecastKey, error: PipecastError) -> Self {
        Self {
            key,
            result: Err(error),
            artifacts: Vec::new(),
            stats: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// AOIs for `method` at `threshold`, or the failure reason.
    fn member_outcome(&self, method: ProcessingMethod, threshold: Threshold) -> MemberOutcome {
        match &self.result {
            Ok(sets) => MemberOutcome::Succeeded(
                sets.iter()
                    .filter(|s| s.method == method && s.threshold == threshold)
                    .flat_map(|s| s.aois.iter().cloned())
                    .collect(),
            ),
            Err(e) => MemberOutcome::Failed(e.to_string()),
        }
    }
}

/// The CPU-bound part of a tuple.
struct ExtractionJob {
    key: ForecastKey,
    thresholds: Vec<Threshold>,
    methods: Vec<ProcessingMethod>,
    bins: BinSet,
    min_area: f64,
    extractor: AoiExtractor,
    enricher: Arc<LayerEnricher>,
    boundaries: Arc<Boundaries>,
}

impl ExtractionJob {
    fn run(self, field: Field) -> PipecastResult<Vec<AoiSet>> {
        let land = self
            .boundaries
            .land
            .as_ref()
            .map(|b| b.in_crs(field.crs()))
            .transpose()?;
        let area = self
            .boundaries
            .area
            .as_ref()
            .map(|b| b.in_crs(field.crs()))
            .transpose()?;

        let mut sets = Vec::with_capacity(self.thresholds.len() * self.methods.len());
        for &threshold in &self.thresholds {
            let mut aois =
                self.extractor
                    .extract(&field, threshold.value(), self.min_area, land.as_deref())?;
            if let Some(area) = &area {
                aois = clip_aois(aois, area, self.min_area, &field);
            }
            let bin = self.bins.bin_for(threshold.value()).map(|b| b.label.clone());
            debug!(key = %self.key, %threshold, aois = aois.len(), "Threshold extracted");

            for &method in &self.methods {
                let origin = AoiOrigin {
                    date: self.key.date,
                    forecast_hour: self.key.hour,
                    member: self.key.member.clone(),
                    method,
                };
                let tagged = aois
                    .iter()
                    .cloned()
                    .enumerate()
                    .map(|(i, aoi)| {
                        let aoi = aoi.tagged(origin.clone(), bin.clone(), i);
                        match method {
                            ProcessingMethod::Enhanced => self.enricher.enrich(aoi),
                            ProcessingMethod::Standard => aoi,
                        }
                    })
                    .collect();
                sets.push(AoiSet {
                    method,
                    threshold,
                    aois: tagged,
                });
            }
        }
        Ok(sets)
    }
}

/// The batch pipeline over a grid source and a layer registry.
pub struct Pipeline {
    config: PipelineConfig,
    grids: Arc<dyn GridSource>,
    registry: LayerRegistry,
    cache: Arc<LayerCache>,
    layout: OutputLayout,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, grids: Arc<dyn GridSource>, registry: LayerRegistry) -> Self {
        let layout = OutputLayout::new(&config.output_dir);
        Self {
            config,
            grids,
            registry,
            cache: Arc::new(LayerCache::new()),
            layout,
        }
    }

    /// Pipeline reading ASCII grids from disk and the configured layers.
    pub fn from_config(config: PipelineConfig) -> anyhow::Result<Self> {
        let mut grids = LocalGridSource::new(&config.grids.root, config.grids.crs);
        if let Some(member) = &config.grids.default_member {
            grids = grids.with_default_member(member.clone());
        }
        let registry = build_registry(&config.layers, &config.layer_cache)?;
        Ok(Self::new(config, Arc::new(grids), registry))
    }

    /// Share a layer cache with other pipelines in the process.
    pub fn with_layer_cache(mut self, cache: Arc<LayerCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Run the whole batch and write the manifest.
    ///
    /// Only a manifest that cannot be written is an error; everything else
    /// is recorded in the returned summary.
    #[instrument(skip_all, fields(grids = %self.grids.describe()))]
    pub async fn run(&self) -> anyhow::Result<RunSummary> {
        let mut manifest = RunManifest::new();

        let enricher = Arc::new(LayerEnricher::load(&self.registry, &self.cache).await);
        let boundaries = Arc::new(self.clip_boundaries(&enricher, &mut manifest));

        let keys = self.tuple_keys();
        let tuples = keys.len();
        info!(
            tuples,
            thresholds = self.config.thresholds.len(),
            max_concurrent = self.config.max_concurrent_tuples,
            "Starting extraction"
        );

        let mut outcomes: Vec<TupleOutcome> = stream::iter(keys)
            .map(|key| self.run_tuple(key, enricher.clone(), boundaries.clone()))
            .buffer_unordered(self.config.max_concurrent_tuples)
            .collect()
            .await;
        outcomes.sort_by(|a, b| a.key.cmp(&b.key));

        let mut failed_tuples = 0;
        for outcome in &mut outcomes {
            if let Err(e) = &outcome.result {
                failed_tuples += 1;
                manifest.record_failure(outcome.key.to_string(), e);
            }
            for entry in outcome.artifacts.drain(..) {
                manifest.record_artifact(entry);
            }
            manifest.tuples.append(&mut outcome.stats);
            for (scope, e) in &outcome.failures {
                manifest.record_failure(scope.clone(), e);
            }
        }

        let (rasters, ranked) = self.run_ensembles(&outcomes, &enricher, &mut manifest).await;

        manifest.finish();
        let manifest_path = self.layout.manifest_path();
        manifest
            .write(&manifest_path)
            .await
            .with_context(|| format!("Failed to write manifest {}", manifest_path.display()))?;

        info!(
            tuples,
            failed_tuples,
            rasters,
            ranked,
            failures = manifest.failures.len(),
            "Run complete"
        );

        Ok(RunSummary {
            manifest,
            tuples,
            failed_tuples,
            rasters,
            ranked,
        })
    }

    fn tuple_keys(&self) -> Vec<ForecastKey> {
        let mut keys = Vec::new();
        for &date in &self.config.dates {
            for &hour in &self.config.forecast_hours {
                for member in &self.config.members {
                    keys.push(ForecastKey::new(date, hour, member.clone()));
                }
            }
        }
        keys
    }

    /// Land and analysis-area boundaries in the grid CRS. A requested
    /// boundary that cannot be built is recorded as a failure and AOIs are
    /// left unclipped by it.
    fn clip_boundaries(&self, enricher: &LayerEnricher, manifest: &mut RunManifest) -> Boundaries {
        let crs = self.config.grids.crs;
        let settings = &self.config.extraction;
        let mut boundaries = Boundaries::default();

        if settings.clip_to_land {
            let layer = match &settings.land_layer {
                Some(name) => enricher.layer(name),
                None => enricher.population_layer(),
            };
            boundaries.land = match layer {
                Some(layer) => layer_boundary(layer, crs).unwrap_or_else(|e| {
                    warn!(layer = %layer.name, error = %e, "Land boundary unavailable, AOIs are not land-clipped");
                    manifest.record_failure(format!("layer/{}", layer.name), &e);
                    None
                }),
                None => {
                    let e = PipecastError::layer_load(
                        "land",
                        "clip_to_land is set but no land or population layer is available",
                    );
                    warn!(error = %e, "AOIs are not land-clipped");
                    manifest.record_failure("layer/land", &e);
                    None
                }
            };
        }

        boundaries.area = match &settings.analysis_area {
            None => None,
            Some(AnalysisArea::Bbox(bbox)) => Some(ClipBoundary {
                geometry: MultiPolygon(vec![Rect::from(*bbox).to_polygon()]),
                crs,
            }),
            Some(AnalysisArea::Layer(name)) => match enricher.layer(name) {
                Some(layer) => layer_boundary(layer, crs).unwrap_or_else(|e| {
                    warn!(layer = %name, error = %e, "Analysis area unavailable");
                    manifest.record_failure(format!("layer/{}", name), &e);
                    None
                }),
                None => None,
            },
        };

        boundaries
    }

    #[instrument(skip(self, enricher, boundaries), fields(key = %key))]
    async fn run_tuple(
        &self,
        key: ForecastKey,
        enricher: Arc<LayerEnricher>,
        boundaries: Arc<Boundaries>,
    ) -> TupleOutcome {
        let field = match self.grids.fetch(&key).await {
            Ok(field) => field,
            Err(e) => {
                warn!(error = %e, "Tuple skipped");
                return TupleOutcome::failed(key, e);
            }
        };
        let crs = field.crs();

        let job = ExtractionJob {
            key: key.clone(),
            thresholds: self.config.thresholds.clone(),
            methods: self.config.methods.clone(),
            bins: self.config.bins.clone(),
            min_area: self.config.extraction.min_area,
            extractor: AoiExtractor::new(ExtractorConfig {
                simplify_tolerance: self.config.extraction.simplify_tolerance,
            }),
            enricher,
            boundaries,
        };
        let sets = match run_blocking("extraction", move || job.run(field)).await {
            Ok(sets) => sets,
            Err(e) => {
                warn!(error = %e, "Tuple failed");
                return TupleOutcome::failed(key, e);
            }
        };

        let mut outcome = TupleOutcome {
            key: key.clone(),
            result: Ok(Vec::new()),
            artifacts: Vec::new(),
            stats: Vec::new(),
            failures: Vec::new(),
        };

        for set in &sets {
            let path = self
                .layout
                .aoi_path(set.method, key.date, key.hour, set.threshold, &key.member);
            match write_aoi_geojson(&path, &set.aois, crs).await {
                Ok(()) => outcome.artifacts.push(ArtifactEntry {
                    kind: ArtifactKind::Aois,
                    path: self.layout.relative(&path),
                    date: key.date,
                    forecast_hour: key.hour,
                    threshold: Some(set.threshold.value()),
                    bin: self
                        .config
                        .bins
                        .bin_for(set.threshold.value())
                        .map(|b| b.label.clone()),
                    method: Some(set.method),
                    member: Some(key.member.clone()),
                    count: Some(set.aois.len()),
                }),
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to write AOIs");
                    outcome.failures.push((self.layout.relative(&path), e));
                }
            }
            outcome.stats.push(tuple_stats(&key, set));
        }

        info!(
            sets = sets.len(),
            aois = sets.iter().map(|s| s.aois.len()).sum::<usize>(),
            "Tuple processed"
        );
        outcome.result = Ok(sets);
        outcome
    }

    /// Aggregate and rank every (date, hour) once all tuples are done.
    /// Returns the number of rasters and ranked rows written.
    async fn run_ensembles(
        &self,
        outcomes: &[TupleOutcome],
        enricher: &LayerEnricher,
        manifest: &mut RunManifest,
    ) -> (usize, usize) {
        let method = self.config.ensemble.method;
        let representatives: Vec<(ThresholdBin, Threshold)> = self
            .config
            .bins
            .representatives(&self.config.thresholds)
            .into_iter()
            .map(|(bin, t)| (bin.clone(), t))
            .collect();

        let grid = match self.analysis_grid(outcomes, &representatives) {
            Ok(grid) => grid,
            Err(e) => {
                error!(error = %e, "No analysis grid, skipping ensemble stage");
                manifest.record_failure("analysis_grid", &e);
                return (0, 0);
            }
        };
        info!(
            width = grid.width,
            height = grid.height,
            resolution = grid.resolution,
            crs = %grid.crs,
            "Analysis grid"
        );

        let population = enricher.population_layer().cloned();
        let (mut rasters_written, mut ranked_written) = (0, 0);

        for &date in &self.config.dates {
            for &hour in &self.config.forecast_hours {
                let tuples: Vec<&TupleOutcome> = outcomes
                    .iter()
                    .filter(|o| o.key.date == date && o.key.hour == hour)
                    .collect();

                let mut rasters: HashMap<String, ProbabilityRaster> = HashMap::new();
                let mut candidates: Vec<Aoi> = Vec::new();

                for (bin, threshold) in &representatives {
                    let members: Vec<EnsembleMember> = tuples
                        .iter()
                        .map(|o| EnsembleMember {
                            member: o.key.member.clone(),
                            outcome: o.member_outcome(method, *threshold),
                        })
                        .collect();
                    for m in &members {
                        if let MemberOutcome::Succeeded(aois) = &m.outcome {
                            candidates.extend(aois.iter().cloned());
                        }
                    }

                    if let Some(raster) = self
                        .aggregate_bin(date, hour, bin, members, &grid, manifest)
                        .await
                    {
                        rasters_written += 1;
                        rasters.insert(bin.label.clone(), raster);
                    }
                }

                ranked_written += self
                    .rank(date, hour, candidates, rasters, population.clone(), manifest)
                    .await;
            }
        }

        (rasters_written, ranked_written)
    }

    /// The run-wide analysis grid: the configured extent, or the bounds of
    /// every AOI that feeds aggregation.
    fn analysis_grid(
        &self,
        outcomes: &[TupleOutcome],
        representatives: &[(ThresholdBin, Threshold)],
    ) -> PipecastResult<AnalysisGrid> {
        let spec = &self.config.ensemble.grid;
        if spec.extent.is_some() {
            return spec.resolve(None);
        }

        let mut bounds: Option<BoundingBox> = None;
        for outcome in outcomes {
            let Ok(sets) = &outcome.result else { continue };
            let aois = sets
                .iter()
                .filter(|s| {
                    s.method == self.config.ensemble.method
                        && representatives.iter().any(|(_, t)| *t == s.threshold)
                })
                .flat_map(|s| s.aois.iter());
            for aoi in aois {
                let Some(bbox) = aoi.bbox() else { continue };
                match reproject_bbox(&bbox, aoi.crs, spec.crs) {
                    Ok(b) => bounds = Some(bounds.map_or(b, |acc| acc.union(&b))),
                    Err(e) => debug!(aoi = %aoi.id, error = %e, "AOI bounds not representable in grid CRS"),
                }
            }
        }

        if bounds.is_none() {
            info!("No AOIs to aggregate, using the fallback extent");
        }
        spec.resolve(bounds)
    }

    async fn aggregate_bin(
        &self,
        date: NaiveDate,
        hour: u32,
        bin: &ThresholdBin,
        members: Vec<EnsembleMember>,
        grid: &AnalysisGrid,
        manifest: &mut RunManifest,
    ) -> Option<ProbabilityRaster> {
        let scope = format!("{}/{}/{}", date.format("%Y-%m-%d"), hour_label(hour), bin.label);
        let aggregator = EnsembleAggregator::new(self.config.ensemble.policy);
        let (bin_owned, grid_owned) = (bin.clone(), grid.clone());

        let raster = match run_blocking("aggregation", move || {
            aggregator.aggregate(&members, &bin_owned, &grid_owned)
        })
        .await
        {
            Ok(raster) => raster,
            Err(e) => {
                error!(scope = %scope, error = %e, "Aggregation failed");
                manifest.record_failure(scope, &e);
                return None;
            }
        };
        manifest
            .ensembles
            .push(EnsembleEntry::from_raster(date, hour, &raster));

        let path = self.layout.probability_path(date, hour, bin);
        match raster.to_field() {
            Ok(field) => match write_ascii_grid(&path, &field).await {
                Ok(()) => manifest.record_artifact(ArtifactEntry {
                    kind: ArtifactKind::ProbabilityRaster,
                    path: self.layout.relative(&path),
                    date,
                    forecast_hour: hour,
                    threshold: None,
                    bin: Some(bin.label.clone()),
                    method: Some(self.config.ensemble.method),
                    member: None,
                    count: Some(raster.effective.len()),
                }),
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to write probability raster");
                    manifest.record_failure(self.layout.relative(&path), &e);
                }
            },
            Err(e) => manifest.record_failure(scope, &e),
        }

        if let Some(min_probability) = self.config.ensemble.consensus_probability {
            self.write_consensus(date, hour, bin, &raster, min_probability, manifest)
                .await;
        }

        Some(raster)
    }

    async fn write_consensus(
        &self,
        date: NaiveDate,
        hour: u32,
        bin: &ThresholdBin,
        raster: &ProbabilityRaster,
        min_probability: f64,
        manifest: &mut RunManifest,
    ) {
        let path = self.layout.consensus_path(date, hour, bin);
        let written = match consensus_regions(raster, min_probability, self.config.extraction.min_area) {
            Ok(regions) => write_aoi_geojson(&path, &regions, raster.grid().crs)
                .await
                .map(|()| regions.len()),
            Err(e) => Err(e),
        };
        match written {
            Ok(count) => manifest.record_artifact(ArtifactEntry {
                kind: ArtifactKind::ConsensusRegions,
                path: self.layout.relative(&path),
                date,
                forecast_hour: hour,
                threshold: Some(min_probability),
                bin: Some(bin.label.clone()),
                method: Some(self.config.ensemble.method),
                member: None,
                count: Some(count),
            }),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Consensus regions failed");
                manifest.record_failure(self.layout.relative(&path), &e);
            }
        }
    }

    async fn rank(
        &self,
        date: NaiveDate,
        hour: u32,
        candidates: Vec<Aoi>,
        rasters: HashMap<String, ProbabilityRaster>,
        population: Option<EnrichmentLayer>,
        manifest: &mut RunManifest,
    ) -> usize {
        let ranker = RiskRanker::new(self.config.top_n);
        let considered = candidates.len();
        let ranked = match run_blocking("ranking", move || {
            Ok(ranker.rank(candidates, &rasters, population.as_ref()))
        })
        .await
        {
            Ok(ranked) => ranked,
            Err(e) => {
                let scope = format!("{}/{}/ranking", date.format("%Y-%m-%d"), hour_label(hour));
                manifest.record_failure(scope, &e);
                return 0;
            }
        };

        let path = self.layout.ranked_path(date, hour);
        match write_ranked_csv(&path, &ranked).await {
            Ok(()) => {
                info!(
                    date = %date,
                    hour,
                    considered,
                    ranked = ranked.len(),
                    fallback = ranked.iter().filter(|r| r.area_fallback()).count(),
                    "Ranked list written"
                );
                manifest.record_artifact(ArtifactEntry {
                    kind: ArtifactKind::RankedList,
                    path: self.layout.relative(&path),
                    date,
                    forecast_hour: hour,
                    threshold: None,
                    bin: None,
                    method: Some(self.config.ensemble.method),
                    member: None,
                    count: Some(ranked.len()),
                });
                ranked.len()
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to write ranked list");
                manifest.record_failure(self.layout.relative(&path), &e);
                0
            }
        }
    }
}

/// A loaded vector layer's polygons, dissolved, as a clip boundary in `crs`.
fn layer_boundary(layer: &EnrichmentLayer, crs: CrsCode) -> PipecastResult<Option<ClipBoundary>> {
    match &layer.state {
        LayerState::Ready(loaded) => match loaded.as_ref() {
            LoadedLayer::Vector(vector) => Ok(Some(ClipBoundary {
                geometry: dissolve(&vector.geometry_in(crs)?),
                crs,
            })),
            LoadedLayer::Raster(_) => Err(PipecastError::layer_load(
                &layer.name,
                "raster layers cannot be used as a clip boundary",
            )),
        },
        LayerState::Unavailable(reason) => Err(PipecastError::layer_load(&layer.name, reason.clone())),
    }
}

fn tuple_stats(key: &ForecastKey, set: &AoiSet) -> TupleStats {
    let cells: usize = set.aois.iter().map(|a| a.cell_count).sum();
    let weighted: f64 = set
        .aois
        .iter()
        .map(|a| a.mean_value * a.cell_count as f64)
        .sum();
    TupleStats {
        date: key.date,
        forecast_hour: key.hour,
        member: key.member.clone(),
        method: set.method,
        threshold: set.threshold.value(),
        aoi_count: set.aois.len(),
        total_area: set.aois.iter().map(|a| a.area).sum(),
        mean_value: (cells > 0).then(|| weighted / cells as f64),
        max_value: set.aois.iter().map(|a| a.max_value).reduce(f64::max),
    }
}

async fn run_blocking<T, F>(what: &str, f: F) -> PipecastResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> PipecastResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipecastError::Io(format!("{} task failed: {}", what, e)))?
}
