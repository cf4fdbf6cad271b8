//! Error types for the pipecast pipeline.

use thiserror::Error;

/// Result type alias using PipecastError.
pub type PipecastResult<T> = Result<T, PipecastError>;

/// Primary error type for pipeline operations.
///
/// Variants are grouped by how the pipeline reacts to them: input errors
/// abort a single (date, hour, member) tuple, dependency errors degrade
/// gracefully, aggregation errors abort a single bin.
#[derive(Debug, Error)]
pub enum PipecastError {
    // === Input Errors (abort the tuple) ===
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    // === External Dependency Errors (degrade gracefully) ===
    #[error("Data unavailable for {key}: {reason}")]
    DataUnavailable { key: String, reason: String },

    #[error("Failed to load layer '{layer}': {reason}")]
    LayerLoad { layer: String, reason: String },

    // === Aggregation Errors (abort the bin) ===
    #[error("Aggregation failed for bin '{bin}': {reason}")]
    Aggregation { bin: String, reason: String },

    // === Configuration Errors ===
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Projection error: {0}")]
    Projection(String),

    // === Sink Errors ===
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PipecastError {
    pub fn invalid_grid(msg: impl Into<String>) -> Self {
        Self::InvalidGrid(msg.into())
    }

    pub fn invalid_threshold(msg: impl Into<String>) -> Self {
        Self::InvalidThreshold(msg.into())
    }

    pub fn data_unavailable(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn layer_load(layer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LayerLoad {
            layer: layer.into(),
            reason: reason.into(),
        }
    }

    pub fn aggregation(bin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Aggregation {
            bin: bin.into(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable category, recorded in the run manifest.
    pub fn category(&self) -> &'static str {
        match self {
            PipecastError::InvalidGrid(_) => "invalid_grid",
            PipecastError::InvalidThreshold(_) => "invalid_threshold",
            PipecastError::DataUnavailable { .. } => "data_unavailable",
            PipecastError::LayerLoad { .. } => "layer_load",
            PipecastError::Aggregation { .. } => "aggregation",
            PipecastError::Config(_) => "config",
            PipecastError::Projection(_) => "projection",
            PipecastError::Io(_) => "io",
            PipecastError::Serialization(_) => "serialization",
        }
    }

    /// Whether the pipeline should skip the affected unit of work and keep
    /// going, rather than treating the error as a hard failure of that unit.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            PipecastError::DataUnavailable { .. } | PipecastError::LayerLoad { .. }
        )
    }
}

impl From<std::io::Error> for PipecastError {
    fn from(err: std::io::Error) -> Self {
        PipecastError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PipecastError {
    fn from(err: serde_json::Error) -> Self {
        PipecastError::Serialization(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(PipecastError::invalid_grid("x").category(), "invalid_grid");
        assert_eq!(
            PipecastError::aggregation("5-39", "no members").category(),
            "aggregation"
        );
    }

    #[test]
    fn test_skippable() {
        assert!(PipecastError::data_unavailable("2024-01-01/F00", "missing").is_skippable());
        assert!(PipecastError::layer_load("census", "404").is_skippable());
        assert!(!PipecastError::invalid_threshold("NaN").is_skippable());
    }

    #[test]
    fn test_display() {
        let err = PipecastError::layer_load("census", "connection refused");
        assert_eq!(
            err.to_string(),
            "Failed to load layer 'census': connection refused"
        );
    }
}
