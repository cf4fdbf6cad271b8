//! Output file layout.

use chrono::NaiveDate;
use pipecast_common::time::hour_label;
use pipecast_common::{MemberId, ProcessingMethod, Threshold, ThresholdBin};
use std::path::{Path, PathBuf};

/// Where each artifact of a run is written, relative to `root`.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<method>/<date>/F<hh>_T<thr>_<member>_aois.geojson`
    pub fn aoi_path(
        &self,
        method: ProcessingMethod,
        date: NaiveDate,
        hour: u32,
        threshold: Threshold,
        member: &MemberId,
    ) -> PathBuf {
        self.root
            .join(method.as_str())
            .join(date.format("%Y-%m-%d").to_string())
            .join(format!(
                "{}_T{}_{}_aois.geojson",
                hour_label(hour),
                threshold.label(),
                member
            ))
    }

    fn ensemble_dir(&self, date: NaiveDate, hour: u32) -> PathBuf {
        self.root
            .join("ensemble")
            .join(date.format("%Y-%m-%d").to_string())
            .join(hour_label(hour))
    }

    /// `ensemble/<date>/F<hh>/probability_<bin>.asc`
    pub fn probability_path(&self, date: NaiveDate, hour: u32, bin: &ThresholdBin) -> PathBuf {
        self.ensemble_dir(date, hour)
            .join(format!("probability_{}.asc", bin.file_label()))
    }

    /// `ensemble/<date>/F<hh>/consensus_<bin>.geojson`
    pub fn consensus_path(&self, date: NaiveDate, hour: u32, bin: &ThresholdBin) -> PathBuf {
        self.ensemble_dir(date, hour)
            .join(format!("consensus_{}.geojson", bin.file_label()))
    }

    /// `ensemble/<date>/F<hh>/ranked_aois.csv`
    pub fn ranked_path(&self, date: NaiveDate, hour: u32) -> PathBuf {
        self.ensemble_dir(date, hour).join("ranked_aois.csv")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    /// `path` relative to the root, for the manifest.
    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}
