//! AOI sets as GeoJSON.

use crate::write_atomic;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue};
use pipecast_common::{Aoi, CrsCode, PipecastError, PipecastResult};
use std::path::Path;

/// FeatureCollection for `aois`, with the legacy named-CRS member so
/// readers know the coordinates' CRS.
pub fn aoi_feature_collection(aois: &[Aoi], crs: CrsCode) -> FeatureCollection {
    let mut foreign = JsonObject::new();
    foreign.insert(
        "crs".to_string(),
        serde_json::json!({"type": "name", "properties": {"name": crs.urn()}}),
    );

    FeatureCollection {
        bbox: None,
        features: aois.iter().map(aoi_feature).collect(),
        foreign_members: Some(foreign),
    }
}

fn aoi_feature(aoi: &Aoi) -> Feature {
    let mut props = JsonObject::new();
    props.insert("id".into(), JsonValue::from(aoi.id.clone()));
    if let Some(origin) = &aoi.origin {
        props.insert("date".into(), JsonValue::from(origin.date.format("%Y-%m-%d").to_string()));
        props.insert("forecast_hour".into(), JsonValue::from(origin.forecast_hour));
        props.insert("member".into(), JsonValue::from(origin.member.as_str()));
        props.insert("method".into(), JsonValue::from(origin.method.as_str()));
    }
    props.insert("threshold".into(), number(aoi.threshold));
    props.insert(
        "bin".into(),
        aoi.bin.clone().map(JsonValue::from).unwrap_or(JsonValue::Null),
    );
    props.insert("crs".into(), JsonValue::from(aoi.crs.to_string()));
    props.insert("area".into(), number(aoi.area));
    props.insert("cell_count".into(), JsonValue::from(aoi.cell_count));
    props.insert("mean_value".into(), number(aoi.mean_value));
    props.insert("max_value".into(), number(aoi.max_value));
    for (key, value) in &aoi.stats {
        props.insert(key.clone(), value.to_json());
    }

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geojson::Value::from(&aoi.geometry))),
        id: Some(geojson::feature::Id::String(aoi.id.clone())),
        properties: Some(props),
        foreign_members: None,
    }
}

fn number(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

/// Write `aois` as a GeoJSON file.
pub async fn write_aoi_geojson(path: &Path, aois: &[Aoi], crs: CrsCode) -> PipecastResult<()> {
    let collection = aoi_feature_collection(aois, crs);
    let text = serde_json::to_string_pretty(&collection)
        .map_err(|e| PipecastError::Serialization(format!("GeoJSON: {}", e)))?;
    write_atomic(path, text.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipecast_common::{ProcessingMethod, StatValue};
    use test_utils::{aoi_with_geometry, origin, rect_multipolygon};

    fn aoi() -> Aoi {
        let mut aoi =
            aoi_with_geometry("a", rect_multipolygon(0.0, 0.0, 1.0, 1.0), CrsCode::Epsg4326)
                .tagged(origin("gfs", 6, ProcessingMethod::Enhanced), Some("39-50".into()), 0);
        aoi.set_stat("census", "population_sum", StatValue::Number(12.5));
        aoi.set_stat("rivers", "status", StatValue::unavailable("timeout"));
        aoi
    }

    #[test]
    fn test_collection_has_crs_and_properties() {
        let fc = aoi_feature_collection(&[aoi()], CrsCode::Epsg4326);
        let json = serde_json::to_value(&fc).unwrap();
        assert_eq!(json["crs"]["properties"]["name"], "urn:ogc:def:crs:EPSG::4326");

        let props = &json["features"][0]["properties"];
        assert_eq!(props["id"], "2024-07-01_F06_T39_gfs_enhanced_0");
        assert_eq!(props["forecast_hour"], 6);
        assert_eq!(props["method"], "enhanced");
        assert_eq!(props["census.population_sum"], 12.5);
        assert_eq!(props["rivers.status"], "unavailable(timeout)");
        assert_eq!(json["features"][0]["geometry"]["type"], "MultiPolygon");
    }

    #[tokio::test]
    async fn test_write_empty_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("standard/2024-07-01/F06_T39_gfs_aois.geojson");
        write_aoi_geojson(&path, &[], CrsCode::Epsg5070).await.unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["features"].as_array().unwrap().len(), 0);
        assert_eq!(json["crs"]["properties"]["name"], "urn:ogc:def:crs:EPSG::5070");
        assert!(!path.with_file_name("F06_T39_gfs_aois.geojson.partial").exists());
    }
}
