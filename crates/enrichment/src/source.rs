//! Where layers come from.

use crate::error::{LayerLoadError, LayerResult};
use crate::layer::{LoadedLayer, VectorLayer};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// A place a layer can be loaded from.
#[async_trait]
pub trait LayerSource: Send + Sync {
    /// Path or URL of the layer; part of the cache key.
    fn location(&self) -> String;

    /// Load the layer named `name`.
    async fn load(&self, name: &str) -> LayerResult<LoadedLayer>;
}

/// GeoJSON file on local disk.
#[derive(Debug, Clone)]
pub struct GeoJsonFileSource {
    path: PathBuf,
}

impl GeoJsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LayerSource for GeoJsonFileSource {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load(&self, name: &str) -> LayerResult<LoadedLayer> {
        let text = read_geojson_file(&self.path).await?;
        let layer = tokio::task::spawn_blocking(move || VectorLayer::from_geojson_str(&text))
            .await
            .map_err(|e| LayerLoadError::Io(format!("parse task failed: {}", e)))??;
        debug!(layer = name, features = layer.len(), crs = %layer.crs, "Parsed GeoJSON layer");
        Ok(LoadedLayer::Vector(layer))
    }
}

pub(crate) async fn read_geojson_file(path: &Path) -> LayerResult<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(LayerLoadError::NotFound(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// A layer that is already in memory, such as a population raster read by
/// the storage layer or a fixture in tests.
#[derive(Debug, Clone)]
pub struct StaticLayerSource {
    label: String,
    layer: LoadedLayer,
}

impl StaticLayerSource {
    pub fn new(label: impl Into<String>, layer: LoadedLayer) -> Self {
        Self {
            label: label.into(),
            layer,
        }
    }
}

#[async_trait]
impl LayerSource for StaticLayerSource {
    fn location(&self) -> String {
        format!("memory:{}", self.label)
    }

    async fn load(&self, _name: &str) -> LayerResult<LoadedLayer> {
        Ok(self.layer.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let source = GeoJsonFileSource::new("/nonexistent/zones.geojson");
        let err = source.load("zones").await.unwrap_err();
        assert!(matches!(err, LayerLoadError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_file_source_parses_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zones.geojson");
        std::fs::write(
            &path,
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"id": 1},
                 "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}}
            ]}"#,
        )
        .unwrap();

        let source = GeoJsonFileSource::new(&path);
        assert_eq!(source.location(), path.display().to_string());
        match source.load("zones").await.unwrap() {
            LoadedLayer::Vector(v) => assert_eq!(v.len(), 1),
            other => panic!("unexpected layer {:?}", other),
        }
    }
}
