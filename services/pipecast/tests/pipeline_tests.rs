//! End-to-end runs over in-memory grids and layers.

use enrichment::{
    GeoJsonFileSource, LayerCache, LayerFeature, LayerKind, LayerRegistry, LoadedLayer,
    StaticLayerSource, VectorLayer,
};
use ensemble::MissingMemberPolicy;
use geo::MultiPolygon;
use pipecast::config::AnalysisArea;
use pipecast::{load_config, parse_config, Pipeline, PipelineConfig};
use pipecast_common::{BoundingBox, CrsCode, Field, ForecastKey, ProcessingMethod};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use storage::{read_ascii_grid, InMemoryGridSource};
use test_utils::{
    assert_approx_eq, block_field, example_config_path, field_from_fn, member, preset_config_path,
    rect, sample_date,
    temp_test_dir,
};

fn config(output: &Path) -> PipelineConfig {
    parse_config(&format!(
        r#"
run:
  dates: ["2024-07-01"]
  forecast_hours: [6]
  members: [gfs, hrrr, nam]
  thresholds: [39]
  output_dir: "{}"
grids:
  root: /unused
ensemble:
  analysis_grid:
    resolution: 1.0
"#,
        output.display()
    ))
    .unwrap()
}

fn key(name: &str) -> ForecastKey {
    ForecastKey::new(sample_date(), 6, member(name))
}

/// 10x10 unit-cell field with a 3x3 block of 50 at rows 2-4, cols 2-4,
/// which is x in [2, 5], y in [5, 8].
fn storm() -> Field {
    block_field(10, 10, (2, 4), (2, 4), 50.0, 0.0)
}

fn dry() -> Field {
    block_field(10, 10, (0, 0), (0, 0), 0.0, 0.0)
}

fn grids(fields: Vec<(&str, Field)>) -> Arc<InMemoryGridSource> {
    let mut source = InMemoryGridSource::new();
    for (name, field) in fields {
        source.insert(key(name), field);
    }
    Arc::new(source)
}

fn population_zone(x0: f64, y0: f64, x1: f64, y1: f64, population: f64) -> LoadedLayer {
    let properties = serde_json::json!({ "population": population })
        .as_object()
        .cloned()
        .unwrap();
    LoadedLayer::Vector(VectorLayer::new(
        CrsCode::Epsg4326,
        vec![LayerFeature::new(MultiPolygon(vec![rect(x0, y0, x1, y1)]), properties).unwrap()],
    ))
}

fn census_registry(layer: LoadedLayer) -> LayerRegistry {
    let mut registry = LayerRegistry::new();
    registry
        .register(
            "census",
            LayerKind::Population { attribute: None },
            Arc::new(StaticLayerSource::new("census", layer)),
        )
        .unwrap();
    registry
}

/// Land layer with one feature per polygon.
fn land_registry(polygons: Vec<geo::Polygon<f64>>) -> LayerRegistry {
    let features = polygons
        .into_iter()
        .map(|p| LayerFeature::new(MultiPolygon(vec![p]), serde_json::Map::new()).unwrap())
        .collect();
    let layer = LoadedLayer::Vector(VectorLayer::new(CrsCode::Epsg4326, features));
    let mut registry = LayerRegistry::new();
    registry
        .register("land", LayerKind::Custom, Arc::new(StaticLayerSource::new("land", layer)))
        .unwrap();
    registry
}

fn read_json(path: &Path) -> Value {
    let text = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("cannot read {}: {}", path.display(), e));
    serde_json::from_str(&text).unwrap()
}

fn features(path: &Path) -> Vec<Value> {
    read_json(path)["features"].as_array().cloned().unwrap()
}

fn ranked_rows(output: &Path) -> Vec<Vec<String>> {
    let text =
        std::fs::read_to_string(output.join("ensemble/2024-07-01/F06/ranked_aois.csv")).unwrap();
    text.lines()
        .skip(1)
        .map(|l| l.split(',').map(str::to_string).collect())
        .collect()
}

async fn probability(output: &Path) -> Field {
    read_ascii_grid(
        &output.join("ensemble/2024-07-01/F06/probability_39-50.asc"),
        CrsCode::Epsg4326,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_two_of_three_members() {
    let dir = temp_test_dir();
    let source = grids(vec![("gfs", storm()), ("hrrr", storm()), ("nam", dry())]);
    let pipeline = Pipeline::new(config(dir.path()), source, LayerRegistry::new());

    let summary = pipeline.run().await.unwrap();
    assert!(!summary.has_failures(), "{:?}", summary.manifest.failures);
    assert_eq!(summary.tuples, 3);
    assert_eq!(summary.failed_tuples, 0);
    // Only the 39-50 bin holds a configured threshold
    assert_eq!(summary.rasters, 1);

    for method in ["standard", "enhanced"] {
        for name in ["gfs", "hrrr", "nam"] {
            let path = dir
                .path()
                .join(format!("{}/2024-07-01/F06_T39_{}_aois.geojson", method, name));
            let expected = if name == "nam" { 0 } else { 1 };
            assert_eq!(features(&path).len(), expected, "{}", path.display());
        }
    }

    let aoi = &features(&dir.path().join("standard/2024-07-01/F06_T39_gfs_aois.geojson"))[0];
    assert_eq!(aoi["properties"]["id"], "2024-07-01_F06_T39_gfs_standard_0");
    assert_eq!(aoi["properties"]["bin"], "39-50");
    assert_approx_eq!(aoi["properties"]["area"].as_f64().unwrap(), 9.0, 1e-9);

    let raster = probability(dir.path()).await;
    let covered: Vec<f32> = raster.data().iter().copied().filter(|&v| v > 0.0).collect();
    assert_eq!(covered.len(), 9);
    for v in covered {
        assert_approx_eq!(v, 0.667, 1e-3);
    }

    let rows = ranked_rows(dir.path());
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0], "1");
    assert_eq!(rows[0][12], "area_fallback");
    assert_approx_eq!(rows[0][5].parse::<f64>().unwrap(), 6.0, 1e-3);

    let manifest = read_json(&dir.path().join("manifest.json"));
    assert_eq!(manifest["ensembles"][0]["effective"].as_array().unwrap().len(), 3);
    assert_eq!(manifest["tuples"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn test_missing_member_is_excluded_and_reported() {
    let dir = temp_test_dir();
    let source = grids(vec![("gfs", storm()), ("hrrr", storm())]);
    let pipeline = Pipeline::new(config(dir.path()), source, LayerRegistry::new());

    let summary = pipeline.run().await.unwrap();
    assert!(summary.has_failures());
    assert_eq!(summary.failed_tuples, 1);
    let failure = &summary.manifest.failures[0];
    assert_eq!(failure.scope, "2024-07-01/F06/nam");
    assert_eq!(failure.category, "data_unavailable");

    let ensemble = &summary.manifest.ensembles[0];
    assert_eq!(ensemble.effective, vec![member("gfs"), member("hrrr")]);
    assert_eq!(ensemble.excluded[0].member, member("nam"));

    let raster = probability(dir.path()).await;
    assert_eq!(raster.value_range().map(|(_, max)| max), Some(1.0));
}

#[tokio::test]
async fn test_count_as_zero_policy() {
    let dir = temp_test_dir();
    let mut config = config(dir.path());
    config.ensemble.policy = MissingMemberPolicy::CountAsZero;
    let source = grids(vec![("gfs", storm()), ("hrrr", storm())]);

    Pipeline::new(config, source, LayerRegistry::new())
        .run()
        .await
        .unwrap();

    let raster = probability(dir.path()).await;
    let max = raster.value_range().map(|(_, max)| max).unwrap();
    assert_approx_eq!(max, 0.667, 1e-3);
}

#[tokio::test]
async fn test_invalid_field_fails_only_its_tuple() {
    let dir = temp_test_dir();
    let all_missing = field_from_fn(10, 10, |_, _| f32::NAN);
    let source = grids(vec![("gfs", storm()), ("hrrr", storm()), ("nam", all_missing)]);

    let summary = Pipeline::new(config(dir.path()), source, LayerRegistry::new())
        .run()
        .await
        .unwrap();
    assert_eq!(summary.failed_tuples, 1);
    assert_eq!(summary.manifest.failures[0].category, "invalid_grid");
    assert_eq!(summary.rasters, 1);
}

#[tokio::test]
async fn test_enrichment_with_broken_layer() {
    let dir = temp_test_dir();
    let mut registry = census_registry(population_zone(0.0, 0.0, 10.0, 10.0, 1000.0));
    registry
        .register(
            "broken",
            LayerKind::Custom,
            Arc::new(GeoJsonFileSource::new("/nonexistent/broken.geojson")),
        )
        .unwrap();
    let source = grids(vec![("gfs", storm()), ("hrrr", storm()), ("nam", storm())]);

    let summary = Pipeline::new(config(dir.path()), source, registry)
        .run()
        .await
        .unwrap();
    assert!(!summary.has_failures(), "{:?}", summary.manifest.failures);

    let enhanced = &features(&dir.path().join("enhanced/2024-07-01/F06_T39_gfs_aois.geojson"))[0];
    let props = &enhanced["properties"];
    // 9 of the zone's 100 units of area
    assert_approx_eq!(props["census.population_sum"].as_f64().unwrap(), 90.0, 1e-6);
    assert_eq!(props["census.status"], "ok");
    assert!(props["broken.status"]
        .as_str()
        .unwrap()
        .starts_with("unavailable("));

    let standard = &features(&dir.path().join("standard/2024-07-01/F06_T39_gfs_aois.geojson"))[0];
    assert!(standard["properties"].get("census.population_sum").is_none());

    let rows = ranked_rows(dir.path());
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0][12], "enrichment");
    assert_eq!(rows[0][2], "1.000000");
    assert_approx_eq!(rows[0][4].parse::<f64>().unwrap(), 90.0, 1e-3);
}

#[tokio::test]
async fn test_land_clip_falls_back_to_population_zones() {
    let dir = temp_test_dir();
    let mut config = config(dir.path());
    config.extraction.clip_to_land = true;
    let registry = census_registry(population_zone(0.0, 0.0, 10.0, 6.5, 650.0));
    let source = grids(vec![("gfs", storm()), ("hrrr", storm()), ("nam", storm())]);

    let summary = Pipeline::new(config, source, registry).run().await.unwrap();
    assert!(!summary.has_failures(), "{:?}", summary.manifest.failures);

    let aoi = &features(&dir.path().join("standard/2024-07-01/F06_T39_gfs_aois.geojson"))[0];
    assert_approx_eq!(aoi["properties"]["area"].as_f64().unwrap(), 4.5, 1e-9);
}

#[tokio::test]
async fn test_overlapping_land_features_keep_covered_area() {
    let dir = temp_test_dir();
    let mut config = config(dir.path());
    config.extraction.clip_to_land = true;
    config.extraction.land_layer = Some("land".to_string());
    let registry = land_registry(vec![rect(0.0, 0.0, 6.0, 10.0), rect(4.0, 0.0, 10.0, 10.0)]);
    let soaked = || block_field(10, 10, (0, 9), (0, 9), 50.0, 0.0);
    let source = grids(vec![("gfs", soaked()), ("hrrr", soaked()), ("nam", soaked())]);

    let summary = Pipeline::new(config, source, registry).run().await.unwrap();
    assert!(!summary.has_failures(), "{:?}", summary.manifest.failures);

    let aois = features(&dir.path().join("standard/2024-07-01/F06_T39_gfs_aois.geojson"));
    assert_eq!(aois.len(), 1);
    assert_approx_eq!(aois[0]["properties"]["area"].as_f64().unwrap(), 100.0, 1e-9);
    assert_eq!(aois[0]["properties"]["cell_count"], 100);
}

#[tokio::test]
async fn test_pipelines_share_layer_cache() {
    let cache = Arc::new(LayerCache::new());
    for _ in 0..2 {
        let dir = temp_test_dir();
        let registry = census_registry(population_zone(0.0, 0.0, 10.0, 10.0, 1000.0));
        let source = grids(vec![("gfs", storm()), ("hrrr", storm()), ("nam", storm())]);
        let summary = Pipeline::new(config(dir.path()), source, registry)
            .with_layer_cache(cache.clone())
            .run()
            .await
            .unwrap();
        assert!(!summary.has_failures(), "{:?}", summary.manifest.failures);
    }
    assert_eq!(cache.loaded_count().await, 1);
}

#[tokio::test]
async fn test_analysis_area_clips_aois() {
    let dir = temp_test_dir();
    let mut config = config(dir.path());
    config.extraction.analysis_area =
        Some(AnalysisArea::Bbox(BoundingBox::new(0.0, 0.0, 4.0, 10.0)));
    let source = grids(vec![("gfs", storm()), ("hrrr", storm()), ("nam", storm())]);

    Pipeline::new(config, source, LayerRegistry::new())
        .run()
        .await
        .unwrap();

    // Block x in [2, 5] cut at x = 4 keeps two of its three columns
    let aoi = &features(&dir.path().join("standard/2024-07-01/F06_T39_hrrr_aois.geojson"))[0];
    assert_approx_eq!(aoi["properties"]["area"].as_f64().unwrap(), 6.0, 1e-9);
    assert_eq!(aoi["properties"]["cell_count"], 6);
    assert_approx_eq!(aoi["properties"]["mean_value"].as_f64().unwrap(), 50.0, 1e-9);
}

#[tokio::test]
async fn test_consensus_regions_written() {
    let dir = temp_test_dir();
    let mut config = config(dir.path());
    config.ensemble.consensus_probability = Some(0.5);
    let source = grids(vec![("gfs", storm()), ("hrrr", storm()), ("nam", dry())]);

    let summary = Pipeline::new(config, source, LayerRegistry::new())
        .run()
        .await
        .unwrap();
    assert!(!summary.has_failures());

    let regions = features(&dir.path().join("ensemble/2024-07-01/F06/consensus_39-50.geojson"));
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0]["properties"]["id"], "consensus_39-50_0");
    assert_approx_eq!(regions[0]["properties"]["area"].as_f64().unwrap(), 9.0, 1e-9);
}

#[test]
fn test_example_config_loads() {
    let config = load_config(&example_config_path()).unwrap();
    assert_eq!(config.members.len(), 3);
    assert_eq!(config.layers.len(), 3);
    assert_eq!(config.ensemble.consensus_probability, Some(0.5));
}

#[test]
fn test_quick_test_preset_loads() {
    let config = load_config(&preset_config_path("quick_test")).unwrap();
    assert_eq!(config.forecast_hours, vec![0, 12, 24]);
    assert_eq!(config.thresholds.len(), 2);
    assert_eq!(config.methods, vec![ProcessingMethod::Standard]);
    assert_eq!(config.ensemble.method, ProcessingMethod::Standard);
    assert!(config.layers.is_empty());
    assert!(!config.extraction.clip_to_land);
    assert!(config.ensemble.consensus_probability.is_none());
}

#[test]
fn test_hrrr_presets_load() {
    let presets = [
        ("conus_hrrr", "hrrr", -125.0),
        ("alaska_hrrr", "hrrrak", -180.0),
    ];
    for (name, member_name, west) in presets {
        let config = load_config(&preset_config_path(name)).unwrap();
        assert_eq!(config.members, vec![member(member_name)], "{}", name);
        assert_eq!(config.forecast_hours.len(), 7);
        assert_eq!(config.layers.len(), 2);
        assert_eq!(config.extraction.land_layer.as_deref(), Some("census"));
        match config.extraction.analysis_area {
            Some(AnalysisArea::Bbox(b)) => assert_eq!(b.min_x, west, "{}", name),
            other => panic!("{}: expected a bbox analysis area, got {:?}", name, other),
        }
    }
}

#[test]
fn test_missing_config_file() {
    assert!(load_config(Path::new("/nonexistent/pipecast.yaml")).is_err());
}
