//! Pipeline configuration.
//!
//! The configuration is a single YAML file. `${VAR}` and `${VAR:-default}`
//! references are expanded from the environment before parsing, and the
//! parsed document is validated once into a [`PipelineConfig`]. Any problem
//! found here is a configuration error: the run never starts.

use anyhow::{bail, ensure, Context, Result};
use chrono::NaiveDate;
use enrichment::{LayerKind, RemoteSourceConfig};
use ensemble::MissingMemberPolicy;
use pipecast_common::time::parse_date;
use pipecast_common::{
    AnalysisGrid, BinSet, BoundingBox, CrsCode, MemberId, PipecastResult, ProcessingMethod,
    Threshold,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// YAML Structures
// ============================================================================

/// The configuration file as written.
#[derive(Debug, Clone, Deserialize)]
pub struct PipecastYaml {
    pub run: RunYaml,
    pub grids: GridsYaml,
    #[serde(default)]
    pub bins: Option<BinSet>,
    #[serde(default)]
    pub extraction: ExtractionYaml,
    #[serde(default)]
    pub layers: Vec<LayerYaml>,
    #[serde(default)]
    pub layer_cache: LayerCacheYaml,
    #[serde(default)]
    pub ensemble: EnsembleYaml,
    #[serde(default)]
    pub ranking: RankingYaml,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunYaml {
    /// Forecast dates, `YYYY-MM-DD`
    pub dates: Vec<String>,
    pub forecast_hours: Vec<u32>,
    pub members: Vec<String>,
    pub thresholds: Vec<f64>,
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tuples: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GridsYaml {
    pub root: PathBuf,
    #[serde(default)]
    pub crs: Option<String>,
    /// Member whose grids may be stored as `F<hh>.asc` without a suffix
    #[serde(default)]
    pub default_member: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractionYaml {
    #[serde(default)]
    pub min_area: f64,
    #[serde(default)]
    pub simplify_tolerance: Option<f64>,
    #[serde(default)]
    pub clip_to_land: bool,
    /// Layer used as the land boundary; the population layer when unset
    #[serde(default)]
    pub land_layer: Option<String>,
    #[serde(default)]
    pub analysis_area: Option<AnalysisAreaYaml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisAreaYaml {
    /// `[west, south, east, north]` in grid CRS units
    Bbox([f64; 4]),
    /// Name of a registered layer
    Layer(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayerYaml {
    pub name: String,
    /// `population`, `watershed` or `custom`
    pub kind: String,
    /// Population attribute or watershed id attribute
    #[serde(default)]
    pub attribute: Option<String>,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub url: Option<String>,
    /// ESRI ASCII grid of counts (population layers only)
    #[serde(default)]
    pub raster: Option<PathBuf>,
    /// CRS of a raster layer
    #[serde(default)]
    pub crs: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayerCacheYaml {
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LayerCacheYaml {
    fn default() -> Self {
        Self {
            dir: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnsembleYaml {
    #[serde(default)]
    pub missing_member_policy: MissingMemberPolicy,
    /// Which method's AOIs feed aggregation and ranking
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub analysis_grid: AnalysisGridYaml,
    #[serde(default)]
    pub consensus_probability: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisGridYaml {
    #[serde(default)]
    pub extent: Option<[f64; 4]>,
    #[serde(default = "default_resolution")]
    pub resolution: f64,
    #[serde(default = "default_padding")]
    pub padding: f64,
    #[serde(default)]
    pub crs: Option<String>,
    #[serde(default = "default_fallback_extent")]
    pub fallback_extent: [f64; 4],
}

impl Default for AnalysisGridYaml {
    fn default() -> Self {
        Self {
            extent: None,
            resolution: default_resolution(),
            padding: default_padding(),
            crs: None,
            fallback_extent: default_fallback_extent(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RankingYaml {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for RankingYaml {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
        }
    }
}

fn default_methods() -> Vec<String> {
    vec!["standard".to_string(), "enhanced".to_string()]
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}

fn default_max_concurrent() -> usize {
    4
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_resolution() -> f64 {
    0.1
}

fn default_padding() -> f64 {
    0.25
}

/// Contiguous United States.
fn default_fallback_extent() -> [f64; 4] {
    [-125.0, 24.0, -66.0, 50.0]
}

fn default_top_n() -> usize {
    20
}

// ============================================================================
// Validated Configuration
// ============================================================================

/// Everything a run needs, validated.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub dates: Vec<NaiveDate>,
    pub forecast_hours: Vec<u32>,
    pub members: Vec<MemberId>,
    pub thresholds: Vec<Threshold>,
    pub methods: Vec<ProcessingMethod>,
    pub bins: BinSet,
    pub output_dir: PathBuf,
    pub max_concurrent_tuples: usize,
    pub grids: GridSourceConfig,
    pub extraction: ExtractionSettings,
    pub layers: Vec<LayerConfig>,
    pub layer_cache: RemoteSourceConfig,
    pub ensemble: EnsembleSettings,
    pub top_n: usize,
}

#[derive(Debug, Clone)]
pub struct GridSourceConfig {
    pub root: PathBuf,
    pub crs: CrsCode,
    pub default_member: Option<MemberId>,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionSettings {
    pub min_area: f64,
    pub simplify_tolerance: Option<f64>,
    pub clip_to_land: bool,
    pub land_layer: Option<String>,
    pub analysis_area: Option<AnalysisArea>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisArea {
    Bbox(BoundingBox),
    Layer(String),
}

#[derive(Debug, Clone)]
pub struct LayerConfig {
    pub name: String,
    pub kind: LayerKind,
    pub location: LayerLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerLocation {
    GeoJsonFile(PathBuf),
    Url(String),
    Raster { path: PathBuf, crs: CrsCode },
}

#[derive(Debug, Clone)]
pub struct EnsembleSettings {
    pub policy: MissingMemberPolicy,
    pub method: ProcessingMethod,
    pub grid: AnalysisGridSpec,
    pub consensus_probability: Option<f64>,
}

/// How the analysis grid is obtained: a fixed extent, or the AOI bounds
/// plus padding with `fallback_extent` when there are no AOIs.
#[derive(Debug, Clone)]
pub struct AnalysisGridSpec {
    pub extent: Option<BoundingBox>,
    pub resolution: f64,
    pub padding: f64,
    pub crs: CrsCode,
    pub fallback_extent: BoundingBox,
}

impl AnalysisGridSpec {
    /// The grid for a run whose AOIs span `aoi_bounds` (grid CRS).
    pub fn resolve(&self, aoi_bounds: Option<BoundingBox>) -> PipecastResult<AnalysisGrid> {
        match (self.extent, aoi_bounds) {
            (Some(extent), _) => AnalysisGrid::new(extent, self.resolution, self.crs),
            (None, Some(bounds)) => {
                AnalysisGrid::covering(bounds, self.resolution, self.padding, self.crs)
            }
            (None, None) => {
                AnalysisGrid::covering(self.fallback_extent, self.resolution, 0.0, self.crs)
            }
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Load, expand and validate the configuration at `path`.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid config file: {}", path.display()))
}

/// Expand and validate a configuration document.
pub fn parse_config(content: &str) -> Result<PipelineConfig> {
    let expanded = expand_env_vars(content)?;
    let yaml: PipecastYaml =
        serde_yaml::from_str(&expanded).context("Failed to parse pipecast YAML")?;
    yaml.into_pipeline_config()
}

impl PipecastYaml {
    /// Validate into the runtime configuration.
    pub fn into_pipeline_config(self) -> Result<PipelineConfig> {
        let run = self.run;

        ensure!(!run.dates.is_empty(), "run.dates must list at least one date");
        let dates = run
            .dates
            .iter()
            .map(|d| parse_date(d).with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", d)))
            .collect::<Result<Vec<_>>>()?;
        ensure_unique(dates.iter(), "date")?;

        ensure!(
            !run.forecast_hours.is_empty(),
            "run.forecast_hours must list at least one hour"
        );
        ensure_unique(run.forecast_hours.iter(), "forecast hour")?;
        ensure!(!run.members.is_empty(), "run.members must list at least one member");
        let members = run
            .members
            .iter()
            .map(|m| MemberId::new(m.as_str()).map_err(anyhow::Error::msg))
            .collect::<Result<Vec<_>>>()?;
        ensure_unique(members.iter().map(|m| m.as_str()), "member")?;

        ensure!(!run.thresholds.is_empty(), "run.thresholds must list at least one threshold");
        let thresholds = run
            .thresholds
            .iter()
            .map(|&t| Threshold::new(t).map_err(anyhow::Error::from))
            .collect::<Result<Vec<_>>>()?;

        ensure!(!run.methods.is_empty(), "run.methods must list at least one method");
        let mut methods = run
            .methods
            .iter()
            .map(|m| m.parse::<ProcessingMethod>().map_err(anyhow::Error::msg))
            .collect::<Result<Vec<_>>>()?;
        methods.sort();
        methods.dedup();

        ensure!(
            run.max_concurrent_tuples >= 1,
            "run.max_concurrent_tuples must be at least 1"
        );

        let grids = GridSourceConfig {
            root: self.grids.root,
            crs: parse_crs(self.grids.crs.as_deref(), "grids.crs")?,
            default_member: self
                .grids
                .default_member
                .map(|m| MemberId::new(m).map_err(anyhow::Error::msg))
                .transpose()?,
        };

        let layers = self
            .layers
            .into_iter()
            .map(LayerYaml::into_layer_config)
            .collect::<Result<Vec<_>>>()?;
        ensure_unique(layers.iter().map(|l| l.name.as_str()), "layer")?;
        let layer_exists = |name: &str| layers.iter().any(|l| l.name == name);

        let extraction = {
            let e = self.extraction;
            ensure!(
                e.min_area.is_finite() && e.min_area >= 0.0,
                "extraction.min_area must be finite and non-negative, got {}",
                e.min_area
            );
            if let Some(tolerance) = e.simplify_tolerance {
                ensure!(
                    tolerance.is_finite() && tolerance >= 0.0,
                    "extraction.simplify_tolerance must be finite and non-negative, got {}",
                    tolerance
                );
            }
            if let Some(name) = &e.land_layer {
                ensure!(layer_exists(name), "extraction.land_layer '{}' is not a configured layer", name);
            }
            let analysis_area = match e.analysis_area {
                None => None,
                Some(AnalysisAreaYaml::Bbox(b)) => {
                    let bbox = extent(b, "extraction.analysis_area.bbox")?;
                    Some(AnalysisArea::Bbox(bbox))
                }
                Some(AnalysisAreaYaml::Layer(name)) => {
                    ensure!(
                        layer_exists(&name),
                        "extraction.analysis_area layer '{}' is not a configured layer",
                        name
                    );
                    Some(AnalysisArea::Layer(name))
                }
            };
            ExtractionSettings {
                min_area: e.min_area,
                simplify_tolerance: e.simplify_tolerance,
                clip_to_land: e.clip_to_land,
                land_layer: e.land_layer,
                analysis_area,
            }
        };

        let ensemble = {
            let e = self.ensemble;
            let method = match e.method {
                Some(m) => m.parse::<ProcessingMethod>().map_err(anyhow::Error::msg)?,
                None if methods.contains(&ProcessingMethod::Enhanced) => ProcessingMethod::Enhanced,
                None => ProcessingMethod::Standard,
            };
            ensure!(
                methods.contains(&method),
                "ensemble.method '{}' is not one of run.methods",
                method
            );
            if let Some(p) = e.consensus_probability {
                ensure!(
                    p > 0.0 && p <= 1.0,
                    "ensemble.consensus_probability must be in (0, 1], got {}",
                    p
                );
            }

            let g = e.analysis_grid;
            ensure!(
                g.resolution.is_finite() && g.resolution > 0.0,
                "ensemble.analysis_grid.resolution must be positive, got {}",
                g.resolution
            );
            ensure!(
                g.padding.is_finite() && g.padding >= 0.0,
                "ensemble.analysis_grid.padding must be non-negative, got {}",
                g.padding
            );
            let grid = AnalysisGridSpec {
                extent: g
                    .extent
                    .map(|b| extent(b, "ensemble.analysis_grid.extent"))
                    .transpose()?,
                resolution: g.resolution,
                padding: g.padding,
                crs: match g.crs.as_deref() {
                    Some(crs) => parse_crs(Some(crs), "ensemble.analysis_grid.crs")?,
                    None => grids.crs,
                },
                fallback_extent: extent(g.fallback_extent, "ensemble.analysis_grid.fallback_extent")?,
            };

            EnsembleSettings {
                policy: e.missing_member_policy,
                method,
                grid,
                consensus_probability: e.consensus_probability,
            }
        };

        ensure!(self.ranking.top_n >= 1, "ranking.top_n must be at least 1");

        let cache = self.layer_cache;
        let defaults = RemoteSourceConfig::default();
        let layer_cache = RemoteSourceConfig {
            cache_dir: cache.dir.unwrap_or(defaults.cache_dir),
            request_timeout: Duration::from_secs(cache.request_timeout_secs),
            max_retries: cache.max_retries,
            initial_retry_delay: defaults.initial_retry_delay,
        };

        Ok(PipelineConfig {
            dates,
            forecast_hours: run.forecast_hours,
            members,
            thresholds,
            methods,
            bins: self.bins.unwrap_or_default(),
            output_dir: run.output_dir,
            max_concurrent_tuples: run.max_concurrent_tuples,
            grids,
            extraction,
            layers,
            layer_cache,
            ensemble,
            top_n: self.ranking.top_n,
        })
    }
}

impl LayerYaml {
    fn into_layer_config(self) -> Result<LayerConfig> {
        let kind = match self.kind.trim().to_ascii_lowercase().as_str() {
            "population" => LayerKind::Population {
                attribute: self.attribute,
            },
            "watershed" => LayerKind::Watershed {
                id_attribute: self.attribute,
            },
            "custom" => LayerKind::Custom,
            other => bail!("Layer '{}' has unknown kind '{}'", self.name, other),
        };

        let location = match (self.path, self.url, self.raster) {
            (Some(path), None, None) => LayerLocation::GeoJsonFile(path),
            (None, Some(url), None) => {
                ensure!(
                    url.starts_with("http://") || url.starts_with("https://"),
                    "Layer '{}' url must be http(s), got '{}'",
                    self.name,
                    url
                );
                LayerLocation::Url(url)
            }
            (None, None, Some(path)) => {
                ensure!(
                    kind.is_population(),
                    "Layer '{}': raster sources are only supported for population layers",
                    self.name
                );
                LayerLocation::Raster {
                    path,
                    crs: parse_crs(self.crs.as_deref(), "layer crs")?,
                }
            }
            _ => bail!(
                "Layer '{}' must set exactly one of 'path', 'url' or 'raster'",
                self.name
            ),
        };

        Ok(LayerConfig {
            name: self.name,
            kind,
            location,
        })
    }
}

fn parse_crs(value: Option<&str>, what: &str) -> Result<CrsCode> {
    match value {
        None => Ok(CrsCode::default()),
        Some(s) => CrsCode::parse(s).with_context(|| format!("Invalid {}", what)),
    }
}

fn extent(b: [f64; 4], what: &str) -> Result<BoundingBox> {
    let bbox = BoundingBox::new(b[0], b[1], b[2], b[3]);
    ensure!(
        bbox.is_valid(),
        "{} must be [west, south, east, north] with west < east and south < north, got {:?}",
        what,
        b
    );
    Ok(bbox)
}

fn ensure_unique<T>(items: impl Iterator<Item = T>, what: &str) -> Result<()>
where
    T: Eq + Hash + fmt::Display,
{
    let mut seen = HashSet::new();
    for item in items {
        let shown = item.to_string();
        ensure!(seen.insert(item), "Duplicate {} '{}'", what, shown);
    }
    Ok(())
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand `${VAR}` and `${VAR:-default}` references in `content`.
pub fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut expr = String::new();
            let mut depth = 1;
            for c in chars.by_ref() {
                match c {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
                expr.push(c);
            }
            if depth != 0 {
                bail!("Unclosed variable reference '${{{}'", expr);
            }
            result.push_str(&resolve_var_expr(&expr)?);
        } else {
            result.push(c);
        }
    }

    Ok(result)
}

/// Resolve `VAR` or `VAR:-default`. An empty variable counts as unset when
/// a default is given.
fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((name, default)) = expr.split_once(":-") {
        return Ok(match std::env::var(name) {
            Ok(value) if !value.is_empty() => value,
            _ => default.to_string(),
        });
    }
    std::env::var(expr).with_context(|| format!("Environment variable '{}' is not set", expr))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
run:
  dates: ["2024-07-01"]
  forecast_hours: [6]
  members: [gfs, hrrr]
  thresholds: [39]
grids:
  root: /data/grids
"#;

    #[test]
    fn test_expand_env_vars_simple() {
        std::env::set_var("PIPECAST_TEST_VAR", "test_value");
        let result = expand_env_vars("prefix_${PIPECAST_TEST_VAR}_suffix").unwrap();
        assert_eq!(result, "prefix_test_value_suffix");
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        std::env::remove_var("PIPECAST_NONEXISTENT_VAR");
        let result = expand_env_vars("value_${PIPECAST_NONEXISTENT_VAR:-default}_end").unwrap();
        assert_eq!(result, "value_default_end");
    }

    #[test]
    fn test_expand_env_vars_missing_required() {
        std::env::remove_var("PIPECAST_REQUIRED_VAR");
        assert!(expand_env_vars("${PIPECAST_REQUIRED_VAR}").is_err());
    }

    #[test]
    fn test_expand_env_vars_unclosed() {
        assert!(expand_env_vars("root: ${OOPS").is_err());
    }

    #[test]
    fn test_resolve_var_expr_override_default() {
        std::env::set_var("PIPECAST_SET_VAR", "custom");
        assert_eq!(resolve_var_expr("PIPECAST_SET_VAR:-default").unwrap(), "custom");
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.members.len(), 2);
        assert_eq!(
            config.methods,
            vec![ProcessingMethod::Standard, ProcessingMethod::Enhanced]
        );
        assert_eq!(config.ensemble.method, ProcessingMethod::Enhanced);
        assert_eq!(config.ensemble.policy, MissingMemberPolicy::Exclude);
        assert_eq!(config.bins, BinSet::default_bins());
        assert_eq!(config.top_n, 20);
        assert_eq!(config.ensemble.grid.padding, 0.25);
        assert_eq!(config.grids.crs, CrsCode::Epsg4326);
        assert!(config.ensemble.grid.extent.is_none());
    }

    #[test]
    fn test_bad_date_rejected() {
        let text = MINIMAL.replace("2024-07-01", "07/01/2024");
        let err = parse_config(&text).unwrap_err();
        assert!(format!("{:#}", err).contains("YYYY-MM-DD"));
    }

    #[test]
    fn test_negative_threshold_rejected() {
        assert!(parse_config(&MINIMAL.replace("[39]", "[-1]")).is_err());
    }

    #[test]
    fn test_unknown_method_rejected() {
        let text = MINIMAL.replace("thresholds: [39]", "thresholds: [39]\n  methods: [fancy]");
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn test_gapped_bins_rejected() {
        let text = format!(
            "{}bins:\n  - {{low: 0, high: 10, label: low}}\n  - {{low: 20, label: high}}\n",
            MINIMAL
        );
        let err = parse_config(&text).unwrap_err();
        assert!(format!("{:#}", err).contains("contiguous"));
    }

    #[test]
    fn test_duplicate_layer_rejected() {
        let text = format!(
            "{}layers:\n  - {{name: census, kind: population, path: a.geojson}}\n  - {{name: census, kind: custom, path: b.geojson}}\n",
            MINIMAL
        );
        let err = parse_config(&text).unwrap_err();
        assert!(format!("{:#}", err).contains("Duplicate layer"));
    }

    #[test]
    fn test_layer_needs_one_location() {
        let text = format!(
            "{}layers:\n  - {{name: census, kind: population, path: a.geojson, url: 'https://x/a.geojson'}}\n",
            MINIMAL
        );
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn test_raster_layer_must_be_population() {
        let text = format!(
            "{}layers:\n  - {{name: huc, kind: watershed, raster: huc.asc}}\n",
            MINIMAL
        );
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn test_zero_resolution_rejected() {
        let text = format!("{}ensemble:\n  analysis_grid:\n    resolution: 0\n", MINIMAL);
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn test_land_layer_must_exist() {
        let text = format!("{}extraction:\n  clip_to_land: true\n  land_layer: land\n", MINIMAL);
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn test_layers_and_analysis_area() {
        let text = format!(
            "{}layers:\n  - {{name: census, kind: population, attribute: POP, path: census.geojson}}\n  - {{name: huc12, kind: watershed, url: 'https://example.com/huc12.geojson'}}\n  - {{name: gridpop, kind: population, raster: pop.asc, crs: 'EPSG:5070'}}\nextraction:\n  analysis_area:\n    bbox: [-100, 30, -90, 40]\n",
            MINIMAL
        );
        let config = parse_config(&text).unwrap();
        assert_eq!(config.layers.len(), 3);
        assert_eq!(
            config.layers[0].kind,
            LayerKind::Population {
                attribute: Some("POP".to_string())
            }
        );
        assert_eq!(
            config.layers[2].location,
            LayerLocation::Raster {
                path: PathBuf::from("pop.asc"),
                crs: CrsCode::Epsg5070
            }
        );
        assert_eq!(
            config.extraction.analysis_area,
            Some(AnalysisArea::Bbox(BoundingBox::new(-100.0, 30.0, -90.0, 40.0)))
        );
    }

    #[test]
    fn test_ensemble_method_must_be_run() {
        let text = MINIMAL.replace("thresholds: [39]", "thresholds: [39]\n  methods: [standard]")
            + "ensemble:\n  method: enhanced\n";
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn test_grid_spec_resolution() {
        let spec = AnalysisGridSpec {
            extent: None,
            resolution: 0.5,
            padding: 0.25,
            crs: CrsCode::Epsg4326,
            fallback_extent: BoundingBox::new(0.0, 0.0, 2.0, 1.0),
        };
        let derived = spec.resolve(Some(BoundingBox::new(1.1, 1.1, 1.9, 1.4))).unwrap();
        assert_eq!(derived.bounds, BoundingBox::new(0.5, 0.5, 2.5, 2.0));
        let fallback = spec.resolve(None).unwrap();
        assert_eq!((fallback.width, fallback.height), (4, 2));
    }
}
