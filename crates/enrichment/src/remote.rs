//! GeoJSON layers fetched over HTTP and cached on local disk.

use crate::error::{LayerLoadError, LayerResult};
use crate::layer::{LoadedLayer, VectorLayer};
use crate::source::{read_geojson_file, LayerSource};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

/// Download settings for remote layers.
#[derive(Debug, Clone)]
pub struct RemoteSourceConfig {
    /// Directory holding downloaded layers
    pub cache_dir: PathBuf,
    /// HTTP request timeout
    pub request_timeout: Duration,
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial retry delay (doubles each retry)
    pub initial_retry_delay: Duration,
}

impl Default for RemoteSourceConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("pipecast-layers"),
            request_timeout: Duration::from_secs(120),
            max_retries: 3,
            initial_retry_delay: Duration::from_secs(1),
        }
    }
}

/// A GeoJSON layer at a URL.
///
/// The file is downloaded once into `cache_dir` (via a `.partial` file that
/// is renamed on completion) and read from there afterwards.
pub struct RemoteGeoJsonSource {
    url: String,
    client: Client,
    config: RemoteSourceConfig,
}

impl RemoteGeoJsonSource {
    pub fn new(url: impl Into<String>, config: RemoteSourceConfig) -> LayerResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
            config,
        })
    }

    /// Local file the layer is cached in.
    pub fn cached_path(&self, name: &str) -> PathBuf {
        let file = self
            .url
            .rsplit('/')
            .next()
            .filter(|f| !f.is_empty() && !f.contains('?'))
            .map(|f| f.to_string())
            .unwrap_or_else(|| format!("{}.geojson", name));
        self.config.cache_dir.join(format!("{}-{}", name, file))
    }

    async fn fetch(&self, target: &Path) -> LayerResult<()> {
        fs::create_dir_all(&self.config.cache_dir).await?;
        let temp = target.with_extension("partial");

        let mut attempt = 0;
        let mut delay = self.config.initial_retry_delay;
        loop {
            match self.fetch_once(&temp).await {
                Ok(bytes) => {
                    if fs::rename(&temp, target).await.is_err() {
                        fs::copy(&temp, target).await?;
                        fs::remove_file(&temp).await?;
                    }
                    info!(url = %self.url, bytes, path = %target.display(), "Layer downloaded");
                    return Ok(());
                }
                Err(e @ LayerLoadError::NotFound(_)) => {
                    fs::remove_file(&temp).await.ok();
                    return Err(e);
                }
                Err(e) => {
                    fs::remove_file(&temp).await.ok();
                    attempt += 1;
                    if attempt > self.config.max_retries {
                        return Err(e);
                    }
                    warn!(
                        error = %e,
                        retry = attempt,
                        max_retries = self.config.max_retries,
                        "Layer download failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    async fn fetch_once(&self, temp: &Path) -> LayerResult<u64> {
        let response = self.client.get(&self.url).send().await?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(LayerLoadError::NotFound(self.url.clone())),
            status => return Err(LayerLoadError::Http(format!("{} from {}", status, self.url))),
        }

        let mut file = fs::File::create(temp).await?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

#[async_trait]
impl LayerSource for RemoteGeoJsonSource {
    fn location(&self) -> String {
        self.url.clone()
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn load(&self, name: &str) -> LayerResult<LoadedLayer> {
        let path = self.cached_path(name);
        if fs::try_exists(&path).await.unwrap_or(false) {
            info!(path = %path.display(), "Using cached layer download");
        } else {
            self.fetch(&path).await?;
        }

        let text = read_geojson_file(&path).await?;
        let layer = tokio::task::spawn_blocking(move || VectorLayer::from_geojson_str(&text))
            .await
            .map_err(|e| LayerLoadError::Io(format!("parse task failed: {}", e)))??;
        Ok(LoadedLayer::Vector(layer))
    }
}
