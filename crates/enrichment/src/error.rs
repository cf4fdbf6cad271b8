//! Layer loading errors.

use pipecast_common::{CrsCode, PipecastError};
use thiserror::Error;

pub type LayerResult<T> = Result<T, LayerLoadError>;

#[derive(Debug, Error)]
pub enum LayerLoadError {
    #[error("layer file not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("cannot parse layer: {0}")]
    Parse(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("unsupported CRS: {0}")]
    UnsupportedCrs(String),

    #[error("layer declares {declared} but its bounds {bounds} look projected")]
    CrsMismatch { declared: CrsCode, bounds: String },

    #[error("no population attribute found (tried {0})")]
    MissingAttribute(String),

    #[error("{0}")]
    Unsupported(String),
}

impl LayerLoadError {
    /// Attach the layer name, producing the pipeline-level error.
    pub fn for_layer(self, layer: &str) -> PipecastError {
        PipecastError::layer_load(layer, self.to_string())
    }
}

impl From<std::io::Error> for LayerLoadError {
    fn from(err: std::io::Error) -> Self {
        LayerLoadError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for LayerLoadError {
    fn from(err: reqwest::Error) -> Self {
        LayerLoadError::Http(err.to_string())
    }
}
