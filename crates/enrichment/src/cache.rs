//! Process-wide cache of loaded layers.

use crate::error::LayerResult;
use crate::layer::LoadedLayer;
use crate::source::LayerSource;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

type CacheKey = (String, String);

/// Loaded layers keyed by (name, location).
///
/// Each layer is loaded at most once per process even when many tasks ask
/// for it concurrently: the first caller loads while the others wait on the
/// same cell. A failed load leaves the cell empty, so a later call retries.
#[derive(Default)]
pub struct LayerCache {
    cells: Mutex<HashMap<CacheKey, Arc<OnceCell<Arc<LoadedLayer>>>>>,
}

impl LayerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_load(
        &self,
        name: &str,
        source: &dyn LayerSource,
    ) -> LayerResult<Arc<LoadedLayer>> {
        let key = (name.to_string(), source.location());
        let cell = {
            let mut cells = self.cells.lock().await;
            cells.entry(key).or_default().clone()
        };

        if let Some(layer) = cell.get() {
            debug!(layer = name, "Layer cache hit");
            return Ok(layer.clone());
        }

        let layer = cell
            .get_or_try_init(|| async {
                let layer = source.load(name).await?;
                info!(layer = name, location = %source.location(), loaded = %layer.describe(), "Layer loaded");
                Ok::<_, crate::error::LayerLoadError>(Arc::new(layer))
            })
            .await?;
        Ok(layer.clone())
    }

    /// Number of layers loaded so far.
    pub async fn loaded_count(&self) -> usize {
        let cells = self.cells.lock().await;
        cells.values().filter(|c| c.initialized()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LayerLoadError;
    use crate::layer::VectorLayer;
    use async_trait::async_trait;
    use pipecast_common::CrsCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        loads: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl LayerSource for CountingSource {
        fn location(&self) -> String {
            "counting".to_string()
        }

        async fn load(&self, _name: &str) -> LayerResult<LoadedLayer> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.fail {
                return Err(LayerLoadError::Http("503".to_string()));
            }
            Ok(LoadedLayer::Vector(VectorLayer::new(CrsCode::Epsg4326, vec![])))
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_load_once() {
        let cache = Arc::new(LayerCache::new());
        let source = Arc::new(CountingSource {
            loads: AtomicUsize::new(0),
            fail: false,
        });

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let source = source.clone();
                tokio::spawn(async move { cache.get_or_load("zones", source.as_ref()).await })
            })
            .collect();
        for task in futures::future::join_all(tasks).await {
            assert!(task.unwrap().is_ok());
        }

        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.loaded_count().await, 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let cache = LayerCache::new();
        let source = CountingSource {
            loads: AtomicUsize::new(0),
            fail: true,
        };
        assert!(cache.get_or_load("zones", &source).await.is_err());
        assert!(cache.get_or_load("zones", &source).await.is_err());
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
        assert_eq!(cache.loaded_count().await, 0);
    }

    #[tokio::test]
    async fn test_same_name_different_location() {
        let cache = LayerCache::new();
        let a = crate::source::StaticLayerSource::new(
            "a",
            LoadedLayer::Vector(VectorLayer::new(CrsCode::Epsg4326, vec![])),
        );
        let b = crate::source::StaticLayerSource::new(
            "b",
            LoadedLayer::Vector(VectorLayer::new(CrsCode::Epsg5070, vec![])),
        );
        let la = cache.get_or_load("zones", &a).await.unwrap();
        let lb = cache.get_or_load("zones", &b).await.unwrap();
        assert_eq!(la.crs(), CrsCode::Epsg4326);
        assert_eq!(lb.crs(), CrsCode::Epsg5070);
    }
}
