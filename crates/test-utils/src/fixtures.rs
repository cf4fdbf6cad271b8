//! Common test fixtures for pipecast tests.

use chrono::NaiveDate;
use geo::{Area, MultiPolygon};
use pipecast_common::{Aoi, AoiOrigin, AoiStats, CrsCode, MemberId, ProcessingMethod};

/// Common bounding box definitions for testing, as (min_x, min_y, max_x, max_y).
pub mod bbox {
    /// Continental United States bounding box
    pub const CONUS: (f64, f64, f64, f64) = (-125.0, 24.0, -66.0, 50.0);

    /// A one-degree box in Kansas
    pub const SMALL: (f64, f64, f64, f64) = (-100.0, 38.0, -99.0, 39.0);
}

/// Run date used throughout the tests.
pub fn sample_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, 1).expect("valid date")
}

pub fn member(name: &str) -> MemberId {
    MemberId::new(name).expect("valid member id")
}

/// Origin for `member` at `hour` on the sample date.
pub fn origin(member_name: &str, hour: u32, method: ProcessingMethod) -> AoiOrigin {
    AoiOrigin {
        date: sample_date(),
        forecast_hour: hour,
        member: member(member_name),
        method,
    }
}

/// AOI with the given geometry, area derived from it, and plausible
/// field statistics.
pub fn aoi_with_geometry(id: &str, geometry: MultiPolygon<f64>, crs: CrsCode) -> Aoi {
    let area = geometry.unsigned_area();
    Aoi {
        id: id.to_string(),
        origin: None,
        threshold: 39.0,
        bin: Some("39-50".to_string()),
        crs,
        geometry,
        area,
        cell_count: area.round().max(1.0) as usize,
        mean_value: 45.0,
        max_value: 50.0,
        stats: AoiStats::new(),
    }
}
