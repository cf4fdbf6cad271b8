//! Areas of Interest: polygons where a field meets a threshold, plus their
//! attributes.

use crate::{BoundingBox, CrsCode, MemberId};
use chrono::NaiveDate;
use geo::MultiPolygon;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Enrichment statistics keyed by `<layer>.<stat>`.
pub type AoiStats = BTreeMap<String, StatValue>;

/// A single enrichment statistic.
#[derive(Debug, Clone, PartialEq)]
pub enum StatValue {
    Count(u64),
    Number(f64),
    Text(String),
    /// Layer loaded and was applied
    Ok,
    /// Layer could not be used for this AOI
    Unavailable { reason: String },
}

impl StatValue {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        StatValue::Unavailable {
            reason: reason.into(),
        }
    }

    /// Numeric view of counts and numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StatValue::Count(c) => Some(*c as f64),
            StatValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, StatValue::Unavailable { .. })
    }

    /// JSON representation used for GeoJSON properties and CSV cells.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            StatValue::Count(c) => serde_json::Value::from(*c),
            StatValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            StatValue::Text(_) | StatValue::Ok | StatValue::Unavailable { .. } => {
                serde_json::Value::String(self.to_string())
            }
        }
    }
}

impl fmt::Display for StatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatValue::Count(c) => write!(f, "{}", c),
            StatValue::Number(n) => write!(f, "{}", n),
            StatValue::Text(s) => f.write_str(s),
            StatValue::Ok => f.write_str("ok"),
            StatValue::Unavailable { reason } => write!(f, "unavailable({})", reason),
        }
    }
}

impl Serialize for StatValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// How an AOI set was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMethod {
    /// Extraction only
    Standard,
    /// Extraction followed by layer enrichment
    Enhanced,
}

impl ProcessingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingMethod::Standard => "standard",
            ProcessingMethod::Enhanced => "enhanced",
        }
    }
}

impl fmt::Display for ProcessingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProcessingMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(ProcessingMethod::Standard),
            "enhanced" => Ok(ProcessingMethod::Enhanced),
            other => Err(format!("unknown processing method '{}'", other)),
        }
    }
}

/// Where an AOI came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AoiOrigin {
    pub date: NaiveDate,
    pub forecast_hour: u32,
    pub member: MemberId,
    pub method: ProcessingMethod,
}

/// An Area of Interest.
///
/// Produced by the extractor with geometry and field statistics; the
/// pipeline then tags it with its origin, and the enricher adds entries to
/// `stats`.
#[derive(Debug, Clone)]
pub struct Aoi {
    pub id: String,
    pub origin: Option<AoiOrigin>,
    pub threshold: f64,
    pub bin: Option<String>,
    pub crs: CrsCode,
    pub geometry: MultiPolygon<f64>,
    /// Area in CRS units squared
    pub area: f64,
    pub cell_count: usize,
    pub mean_value: f64,
    pub max_value: f64,
    pub stats: AoiStats,
}

impl Aoi {
    /// Attach origin and bin, and derive the stable id
    /// `<date>_F<hh>_T<thr>_<member>_<method>_<n>` from the extraction index.
    pub fn tagged(mut self, origin: AoiOrigin, bin: Option<String>, index: usize) -> Self {
        self.id = format!(
            "{}_{}_T{}_{}_{}_{}",
            origin.date.format("%Y-%m-%d"),
            crate::time::hour_label(origin.forecast_hour),
            crate::threshold::threshold_label(self.threshold),
            origin.member,
            origin.method,
            index
        );
        self.origin = Some(origin);
        self.bin = bin;
        self
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        BoundingBox::of_geometry(&self.geometry)
    }

    pub fn stat(&self, key: &str) -> Option<&StatValue> {
        self.stats.get(key)
    }

    pub fn set_stat(&mut self, layer: &str, stat: &str, value: StatValue) {
        self.stats.insert(format!("{}.{}", layer, stat), value);
    }

    /// First `<layer>.population_sum` statistic, if any layer produced one.
    pub fn population(&self) -> Option<f64> {
        self.stats
            .iter()
            .find(|(k, _)| k.ends_with(".population_sum"))
            .and_then(|(_, v)| v.as_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn sample() -> Aoi {
        Aoi {
            id: "aoi-0".to_string(),
            origin: None,
            threshold: 39.0,
            bin: None,
            crs: CrsCode::Epsg4326,
            geometry: MultiPolygon(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 2.0, y: 0.0),
                (x: 2.0, y: 1.0),
                (x: 0.0, y: 1.0),
            ]]),
            area: 2.0,
            cell_count: 2,
            mean_value: 45.0,
            max_value: 50.0,
            stats: AoiStats::new(),
        }
    }

    #[test]
    fn test_tagged_id() {
        let origin = AoiOrigin {
            date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            forecast_hour: 6,
            member: MemberId::new("gfs").unwrap(),
            method: ProcessingMethod::Enhanced,
        };
        let aoi = sample().tagged(origin.clone(), Some("39-50".to_string()), 3);
        assert_eq!(aoi.id, "2024-07-01_F06_T39_gfs_enhanced_3");
        assert_eq!(aoi.bin.as_deref(), Some("39-50"));

        // Same label as the output file names
        let mut fractional = sample();
        fractional.threshold = 12.5;
        let aoi = fractional.tagged(origin, None, 0);
        let label = crate::Threshold::new(12.5).unwrap().label();
        assert_eq!(aoi.id, format!("2024-07-01_F06_T{}_gfs_enhanced_0", label));
    }

    #[test]
    fn test_stats_namespacing() {
        let mut aoi = sample();
        aoi.set_stat("census", "population_sum", StatValue::Number(1200.5));
        aoi.set_stat("census", "status", StatValue::Ok);
        aoi.set_stat("rivers", "status", StatValue::unavailable("404"));

        assert_eq!(aoi.population(), Some(1200.5));
        assert_eq!(aoi.stat("census.status"), Some(&StatValue::Ok));
        assert!(aoi.stat("rivers.status").unwrap().is_unavailable());
        assert_eq!(
            aoi.stat("rivers.status").unwrap().to_string(),
            "unavailable(404)"
        );
    }

    #[test]
    fn test_stat_json() {
        assert_eq!(StatValue::Count(3).to_json(), serde_json::json!(3));
        assert_eq!(StatValue::Number(f64::NAN).to_json(), serde_json::Value::Null);
        assert_eq!(StatValue::Ok.to_json(), serde_json::json!("ok"));
    }

    #[test]
    fn test_method_parse() {
        assert_eq!(
            "Enhanced".parse::<ProcessingMethod>().unwrap(),
            ProcessingMethod::Enhanced
        );
        assert!("fancy".parse::<ProcessingMethod>().is_err());
    }

    #[test]
    fn test_bbox() {
        assert_eq!(sample().bbox(), Some(BoundingBox::new(0.0, 0.0, 2.0, 1.0)));
    }
}
