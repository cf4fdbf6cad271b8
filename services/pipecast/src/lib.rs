//! Pipecast batch service library.
//!
//! This module exposes the internal modules for testing purposes.

pub mod config;
pub mod layers;
pub mod pipeline;

pub use config::{load_config, parse_config, PipelineConfig};
pub use pipeline::{AoiSet, Pipeline, RunSummary};
