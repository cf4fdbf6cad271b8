//! The run manifest: every artifact tied to its key, plus failures and
//! per-bin member accounting.

use crate::write_atomic;
use chrono::{DateTime, NaiveDate, Utc};
use ensemble::ProbabilityRaster;
use pipecast_common::{MemberId, PipecastError, PipecastResult, ProcessingMethod};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Aois,
    ProbabilityRaster,
    ConsensusRegions,
    RankedList,
}

/// One written file and the key it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub kind: ArtifactKind,
    /// Path relative to the output root
    pub path: String,
    pub date: NaiveDate,
    pub forecast_hour: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<ProcessingMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<MemberId>,
    /// Number of features or rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

/// A unit of work that failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEntry {
    /// What failed, e.g. `2024-07-01/F06/gfs` or `2024-07-01/F06/39-50`
    pub scope: String,
    pub category: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedMember {
    pub member: MemberId,
    pub reason: String,
}

/// Member accounting for one probability raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleEntry {
    pub date: NaiveDate,
    pub forecast_hour: u32,
    pub bin: String,
    pub attempted: Vec<MemberId>,
    pub effective: Vec<MemberId>,
    pub excluded: Vec<ExcludedMember>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_probability: Option<f64>,
}

impl EnsembleEntry {
    pub fn from_raster(date: NaiveDate, forecast_hour: u32, raster: &ProbabilityRaster) -> Self {
        Self {
            date,
            forecast_hour,
            bin: raster.bin().to_string(),
            attempted: raster.attempted.clone(),
            effective: raster.effective.clone(),
            excluded: raster
                .excluded
                .iter()
                .map(|(member, reason)| ExcludedMember {
                    member: member.clone(),
                    reason: reason.clone(),
                })
                .collect(),
            max_probability: Some(raster.max_value()),
        }
    }
}

/// Summary of one (date, hour, member, method, threshold) extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleStats {
    pub date: NaiveDate,
    pub forecast_hour: u32,
    pub member: MemberId,
    pub method: ProcessingMethod,
    pub threshold: f64,
    pub aoi_count: usize,
    pub total_area: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub artifacts: Vec<ArtifactEntry>,
    pub failures: Vec<FailureEntry>,
    pub ensembles: Vec<EnsembleEntry>,
    pub tuples: Vec<TupleStats>,
}

impl Default for RunManifest {
    fn default() -> Self {
        Self::new()
    }
}

impl RunManifest {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            artifacts: Vec::new(),
            failures: Vec::new(),
            ensembles: Vec::new(),
            tuples: Vec::new(),
        }
    }

    pub fn record_artifact(&mut self, entry: ArtifactEntry) {
        self.artifacts.push(entry);
    }

    pub fn record_failure(&mut self, scope: impl Into<String>, error: &PipecastError) {
        self.failures.push(FailureEntry {
            scope: scope.into(),
            category: error.category().to_string(),
            reason: error.to_string(),
        });
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub async fn write(&self, path: &Path) -> PipecastResult<()> {
        let text = serde_json::to_string_pretty(self)?;
        write_atomic(path, text.as_bytes()).await
    }
}
