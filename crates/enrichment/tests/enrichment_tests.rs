//! Enrichment of AOIs against population, watershed and custom layers.

use async_trait::async_trait;
use enrichment::{
    EnrichmentLayer, GeoJsonFileSource, LayerCache, LayerEnricher, LayerFeature, LayerKind,
    LayerLoadError, LayerRegistry, LayerResult, LayerSource, LoadedLayer, StaticLayerSource,
    VectorLayer,
};
use geo::MultiPolygon;
use pipecast_common::{CrsCode, StatValue};
use projection::reproject_multipolygon;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use test_utils::{aoi_with_geometry, assert_approx_eq, field_from_fn, rect, rect_multipolygon};

/// Source whose load always fails, standing in for an unreachable service.
struct FailingSource;

#[async_trait]
impl LayerSource for FailingSource {
    fn location(&self) -> String {
        "https://layers.invalid/census.geojson".to_string()
    }

    async fn load(&self, _name: &str) -> LayerResult<LoadedLayer> {
        Err(LayerLoadError::Http("connection refused".to_string()))
    }
}

fn props(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn feature(geometry: MultiPolygon<f64>, pairs: &[(&str, Value)]) -> LayerFeature {
    LayerFeature::new(geometry, props(pairs)).unwrap()
}

/// Two unit zones side by side with 100 and 200 people.
fn population_zones() -> LoadedLayer {
    LoadedLayer::Vector(VectorLayer::new(
        CrsCode::Epsg4326,
        vec![
            feature(rect_multipolygon(0.0, 0.0, 1.0, 1.0), &[("POP", json!(100))]),
            feature(rect_multipolygon(1.0, 0.0, 2.0, 1.0), &[("POP", json!(200))]),
        ],
    ))
}

fn static_source(layer: LoadedLayer) -> Arc<dyn LayerSource> {
    Arc::new(StaticLayerSource::new("fixture", layer))
}

async fn enricher_for(registry: &LayerRegistry) -> LayerEnricher {
    LayerEnricher::load(registry, &LayerCache::new()).await
}

#[tokio::test]
async fn test_population_is_area_weighted() {
    let mut registry = LayerRegistry::new();
    registry
        .register(
            "census",
            LayerKind::Population { attribute: None },
            static_source(population_zones()),
        )
        .unwrap();
    let enricher = enricher_for(&registry).await;

    let aoi = aoi_with_geometry("a", rect_multipolygon(0.5, 0.0, 1.5, 1.0), CrsCode::Epsg4326);
    let enriched = enricher.enrich(aoi);

    assert_approx_eq!(
        enriched.stat("census.population_sum").unwrap().as_f64().unwrap(),
        150.0,
        1e-9
    );
    assert_eq!(enriched.stat("census.feature_count"), Some(&StatValue::Count(2)));
    assert_eq!(enriched.stat("census.status"), Some(&StatValue::Ok));
    assert_approx_eq!(enriched.population().unwrap(), 150.0, 1e-9);
}

#[tokio::test]
async fn test_failed_layer_marks_status_and_keeps_others() {
    let mut registry = LayerRegistry::new();
    registry
        .register(
            "census",
            LayerKind::Population { attribute: None },
            Arc::new(FailingSource),
        )
        .unwrap();
    registry
        .register(
            "zones",
            LayerKind::Custom,
            static_source(LoadedLayer::Vector(VectorLayer::from_polygons(
                CrsCode::Epsg4326,
                vec![rect(0.0, 0.0, 10.0, 10.0)],
            ))),
        )
        .unwrap();
    let enricher = enricher_for(&registry).await;
    assert!(enricher.population_layer().is_none());

    let geometry = rect_multipolygon(1.0, 1.0, 3.0, 2.0);
    let enriched = enricher.enrich(aoi_with_geometry("a", geometry.clone(), CrsCode::Epsg4326));

    let status = enriched.stat("census.status").unwrap();
    assert!(status.is_unavailable());
    assert!(status.to_string().contains("connection refused"));
    assert!(enriched.stat("census.population_sum").is_none());

    assert_eq!(enriched.stat("zones.status"), Some(&StatValue::Ok));
    assert_approx_eq!(
        enriched.stat("zones.intersect_area").unwrap().as_f64().unwrap(),
        2.0,
        1e-9
    );
    assert_eq!(enriched.geometry, geometry);
}

#[tokio::test]
async fn test_watershed_dominant_id() {
    let layer = LoadedLayer::Vector(VectorLayer::new(
        CrsCode::Epsg4326,
        vec![
            feature(rect_multipolygon(0.0, 0.0, 2.0, 2.0), &[("huc12", json!("101500010101"))]),
            feature(rect_multipolygon(2.0, 0.0, 4.0, 2.0), &[("huc12", json!("101500010102"))]),
        ],
    ));
    let mut registry = LayerRegistry::new();
    registry
        .register("huc", LayerKind::Watershed { id_attribute: None }, static_source(layer))
        .unwrap();
    let enricher = enricher_for(&registry).await;

    // 0.5 in the first unit, 0.75 in the second
    let aoi = aoi_with_geometry("a", rect_multipolygon(1.5, 0.0, 2.75, 1.0), CrsCode::Epsg4326);
    let enriched = enricher.enrich(aoi);

    assert_eq!(enriched.stat("huc.feature_count"), Some(&StatValue::Count(2)));
    assert_eq!(
        enriched.stat("huc.dominant_id"),
        Some(&StatValue::Text("101500010102".to_string()))
    );
    assert_approx_eq!(
        enriched.stat("huc.intersect_area").unwrap().as_f64().unwrap(),
        1.25,
        1e-9
    );
}

#[tokio::test]
async fn test_no_intersection_omits_dominant_id() {
    let layer = LoadedLayer::Vector(VectorLayer::from_polygons(
        CrsCode::Epsg4326,
        vec![rect(50.0, 50.0, 51.0, 51.0)],
    ));
    let mut registry = LayerRegistry::new();
    registry
        .register("huc", LayerKind::Watershed { id_attribute: None }, static_source(layer))
        .unwrap();
    let enricher = enricher_for(&registry).await;

    let enriched = enricher.enrich(aoi_with_geometry(
        "a",
        rect_multipolygon(0.0, 0.0, 1.0, 1.0),
        CrsCode::Epsg4326,
    ));
    assert_eq!(enriched.stat("huc.feature_count"), Some(&StatValue::Count(0)));
    assert!(enriched.stat("huc.dominant_id").is_none());
    assert_eq!(enriched.stat("huc.status"), Some(&StatValue::Ok));
}

#[tokio::test]
async fn test_raster_population_sums_covered_cells() {
    // 4x4 unit cells holding 10 people each
    let field = field_from_fn(4, 4, |_, _| 10.0);
    let mut registry = LayerRegistry::new();
    registry
        .register(
            "gridpop",
            LayerKind::Population { attribute: None },
            static_source(LoadedLayer::Raster(field)),
        )
        .unwrap();
    let enricher = enricher_for(&registry).await;

    let enriched = enricher.enrich(aoi_with_geometry(
        "a",
        rect_multipolygon(1.0, 1.0, 3.0, 3.0),
        CrsCode::Epsg4326,
    ));
    assert_approx_eq!(
        enriched.stat("gridpop.population_sum").unwrap().as_f64().unwrap(),
        40.0,
        1e-9
    );
    assert_eq!(enriched.stat("gridpop.cell_count"), Some(&StatValue::Count(4)));
}

#[tokio::test]
async fn test_layer_in_albers_applies_to_geographic_aoi() {
    let zone_geo = rect_multipolygon(-101.0, 37.0, -98.0, 40.0);
    let zone = reproject_multipolygon(&zone_geo, CrsCode::Epsg4326, CrsCode::Epsg5070).unwrap();
    let layer = LoadedLayer::Vector(VectorLayer::new(
        CrsCode::Epsg5070,
        vec![feature(zone, &[("population", json!(9000))])],
    ));
    let mut registry = LayerRegistry::new();
    registry
        .register("census", LayerKind::Population { attribute: None }, static_source(layer))
        .unwrap();
    let enricher = enricher_for(&registry).await;

    // One of the nine degree cells of the zone
    let enriched = enricher.enrich(aoi_with_geometry(
        "a",
        rect_multipolygon(-100.0, 38.0, -99.0, 39.0),
        CrsCode::Epsg4326,
    ));
    let population = enriched.stat("census.population_sum").unwrap().as_f64().unwrap();
    assert!(population > 900.0 && population < 1100.0, "population = {}", population);
    assert_eq!(enriched.stat("census.feature_count"), Some(&StatValue::Count(1)));
}

#[tokio::test]
async fn test_population_layer_without_attribute_is_unavailable() {
    let layer = LoadedLayer::Vector(VectorLayer::new(
        CrsCode::Epsg4326,
        vec![feature(rect_multipolygon(0.0, 0.0, 1.0, 1.0), &[("name", json!("x"))])],
    ));
    let mut registry = LayerRegistry::new();
    registry
        .register("census", LayerKind::Population { attribute: None }, static_source(layer))
        .unwrap();
    let enricher = enricher_for(&registry).await;

    assert!(!enricher.layer("census").unwrap().is_ready());
    let enriched = enricher.enrich(aoi_with_geometry(
        "a",
        rect_multipolygon(0.0, 0.0, 1.0, 1.0),
        CrsCode::Epsg4326,
    ));
    assert!(enriched.stat("census.status").unwrap().is_unavailable());
}

#[tokio::test]
async fn test_population_within_for_ranking() {
    let layer = EnrichmentLayer::ready(
        "census",
        LayerKind::Population {
            attribute: Some("POP".to_string()),
        },
        Arc::new(population_zones()),
    );
    let population = layer
        .population_within(&rect_multipolygon(0.0, 0.0, 2.0, 1.0), CrsCode::Epsg4326)
        .unwrap();
    assert_approx_eq!(population, 300.0, 1e-9);
}

#[tokio::test]
async fn test_file_layer_through_registry() {
    let dir = test_utils::temp_test_dir();
    let path = dir.path().join("zones.geojson");
    std::fs::write(
        &path,
        r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"population": 40},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[2,0],[2,2],[0,2],[0,0]]]}}
        ]}"#,
    )
    .unwrap();

    let mut registry = LayerRegistry::new();
    registry
        .register(
            "census",
            LayerKind::Population { attribute: None },
            Arc::new(GeoJsonFileSource::new(&path)),
        )
        .unwrap();
    let cache = LayerCache::new();
    let enricher = LayerEnricher::load(&registry, &cache).await;
    assert_eq!(enricher.layer("census").unwrap().attribute(), Some("population"));

    let enriched = enricher.enrich(aoi_with_geometry(
        "a",
        rect_multipolygon(0.0, 0.0, 1.0, 1.0),
        CrsCode::Epsg4326,
    ));
    assert_approx_eq!(enriched.population().unwrap(), 10.0, 1e-9);

    // Loading again reuses the cached layer
    LayerEnricher::load(&registry, &cache).await;
    assert_eq!(cache.loaded_count().await, 1);
}
