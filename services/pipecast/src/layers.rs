//! Building the layer registry from configuration.

use crate::config::{LayerConfig, LayerLocation};
use anyhow::{Context, Result};
use async_trait::async_trait;
use enrichment::{
    GeoJsonFileSource, LayerLoadError, LayerRegistry, LayerResult, LayerSource, LoadedLayer,
    RemoteGeoJsonSource, RemoteSourceConfig,
};
use pipecast_common::CrsCode;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Population counts stored as an ESRI ASCII grid.
#[derive(Debug, Clone)]
pub struct RasterLayerSource {
    path: PathBuf,
    crs: CrsCode,
}

impl RasterLayerSource {
    pub fn new(path: impl Into<PathBuf>, crs: CrsCode) -> Self {
        Self {
            path: path.into(),
            crs,
        }
    }
}

#[async_trait]
impl LayerSource for RasterLayerSource {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load(&self, name: &str) -> LayerResult<LoadedLayer> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Err(LayerLoadError::NotFound(self.path.display().to_string()));
        }
        let field = storage::read_ascii_grid(&self.path, self.crs)
            .await
            .map_err(|e| LayerLoadError::Parse(e.to_string()))?;
        debug!(layer = name, width = field.width(), height = field.height(), "Raster layer read");
        Ok(LoadedLayer::Raster(field))
    }
}

/// Register every configured layer, in configuration order.
pub fn build_registry(layers: &[LayerConfig], remote: &RemoteSourceConfig) -> Result<LayerRegistry> {
    let mut registry = LayerRegistry::new();
    for layer in layers {
        let source: Arc<dyn LayerSource> = match &layer.location {
            LayerLocation::GeoJsonFile(path) => Arc::new(GeoJsonFileSource::new(path)),
            LayerLocation::Url(url) => Arc::new(
                RemoteGeoJsonSource::new(url, remote.clone())
                    .with_context(|| format!("Failed to set up download of layer '{}'", layer.name))?,
            ),
            LayerLocation::Raster { path, crs } => Arc::new(RasterLayerSource::new(path, *crs)),
        };
        registry.register(&layer.name, layer.kind.clone(), source)?;
    }
    Ok(registry)
}
