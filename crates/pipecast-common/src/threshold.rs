//! Exceedance thresholds and the bins used to categorize them.

use crate::{PipecastError, PipecastResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A finite, non-negative lower bound (inclusive) defining exceedance.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(value: f64) -> PipecastResult<Self> {
        if !value.is_finite() {
            return Err(PipecastError::invalid_threshold(format!(
                "threshold must be finite, got {}",
                value
            )));
        }
        if value < 0.0 {
            return Err(PipecastError::invalid_threshold(format!(
                "threshold must be non-negative, got {}",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Compact label used in file names: `39`, `12.5`.
    pub fn label(&self) -> String {
        threshold_label(self.0)
    }
}

/// [`Threshold::label`] for a raw value.
pub fn threshold_label(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

impl TryFrom<f64> for Threshold {
    type Error = PipecastError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Threshold::new(value)
    }
}

impl From<Threshold> for f64 {
    fn from(t: Threshold) -> Self {
        t.0
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Half-open value interval `[low, high)` with a label.
///
/// `high == None` means the bin is unbounded above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBin {
    pub low: f64,
    #[serde(default)]
    pub high: Option<f64>,
    pub label: String,
}

impl ThresholdBin {
    pub fn new(low: f64, high: Option<f64>, label: impl Into<String>) -> Self {
        Self {
            low,
            high,
            label: label.into(),
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && self.high.map_or(true, |h| value < h)
    }

    /// Label safe for use in file names (`254+` becomes `254plus`).
    pub fn file_label(&self) -> String {
        self.label.replace('+', "plus").replace(' ', "_")
    }
}

/// Ordered set of bins tiling `[0, +inf)` with no gaps or overlaps.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BinSet {
    bins: Vec<ThresholdBin>,
}

impl BinSet {
    pub fn new(bins: Vec<ThresholdBin>) -> PipecastResult<Self> {
        let first = bins
            .first()
            .ok_or_else(|| PipecastError::Config("bin set is empty".to_string()))?;
        if first.low != 0.0 {
            return Err(PipecastError::Config(format!(
                "first bin '{}' must start at 0, starts at {}",
                first.label, first.low
            )));
        }

        for (i, bin) in bins.iter().enumerate() {
            if bin.label.trim().is_empty() {
                return Err(PipecastError::Config(format!("bin {} has an empty label", i)));
            }
            if !bin.low.is_finite() {
                return Err(PipecastError::Config(format!(
                    "bin '{}' has a non-finite lower bound",
                    bin.label
                )));
            }
            if bins[..i].iter().any(|b| b.label == bin.label) {
                return Err(PipecastError::Config(format!(
                    "duplicate bin label '{}'",
                    bin.label
                )));
            }

            let is_last = i + 1 == bins.len();
            match (bin.high, is_last) {
                (None, true) => {}
                (None, false) => {
                    return Err(PipecastError::Config(format!(
                        "only the last bin may be unbounded, '{}' is not last",
                        bin.label
                    )))
                }
                (Some(_), true) => {
                    return Err(PipecastError::Config(format!(
                        "last bin '{}' must be unbounded above",
                        bin.label
                    )))
                }
                (Some(high), false) => {
                    if !high.is_finite() || high <= bin.low {
                        return Err(PipecastError::Config(format!(
                            "bin '{}' has an empty or invalid range [{}, {})",
                            bin.label, bin.low, high
                        )));
                    }
                    let next = &bins[i + 1];
                    if next.low != high {
                        return Err(PipecastError::Config(format!(
                            "bins '{}' and '{}' are not contiguous ({} != {})",
                            bin.label, next.label, high, next.low
                        )));
                    }
                }
            }
        }

        Ok(Self { bins })
    }

    /// Default precipitation categories (mm).
    pub fn default_bins() -> Self {
        let edges = [
            (0.0, Some(5.0), "0-5"),
            (5.0, Some(39.0), "5-39"),
            (39.0, Some(50.0), "39-50"),
            (50.0, Some(100.0), "50-100"),
            (100.0, Some(254.0), "100-254"),
            (254.0, None, "254+"),
        ];
        Self {
            bins: edges
                .iter()
                .map(|&(low, high, label)| ThresholdBin::new(low, high, label))
                .collect(),
        }
    }

    pub fn bins(&self) -> &[ThresholdBin] {
        &self.bins
    }

    pub fn iter(&self) -> impl Iterator<Item = &ThresholdBin> {
        self.bins.iter()
    }

    pub fn get(&self, label: &str) -> Option<&ThresholdBin> {
        self.bins.iter().find(|b| b.label == label)
    }

    /// Bin containing `value`, if any (negative values fall outside).
    pub fn bin_for(&self, value: f64) -> Option<&ThresholdBin> {
        self.bins.iter().find(|b| b.contains(value))
    }

    /// Representative threshold for each bin that contains at least one of
    /// `thresholds`: the lowest such threshold. Bins with no threshold are
    /// omitted. Output follows bin order.
    pub fn representatives(&self, thresholds: &[Threshold]) -> Vec<(&ThresholdBin, Threshold)> {
        self.bins
            .iter()
            .filter_map(|bin| {
                thresholds
                    .iter()
                    .copied()
                    .filter(|t| bin.contains(t.value()))
                    .min_by(|a, b| a.value().total_cmp(&b.value()))
                    .map(|t| (bin, t))
            })
            .collect()
    }
}

impl Default for BinSet {
    fn default() -> Self {
        Self::default_bins()
    }
}

impl<'de> Deserialize<'de> for BinSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bins = Vec::<ThresholdBin>::deserialize(deserializer)?;
        BinSet::new(bins).map_err(serde::de::Error::custom)
    }
}
