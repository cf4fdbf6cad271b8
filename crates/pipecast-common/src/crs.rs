//! Coordinate Reference System codes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Well-known CRS codes understood by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CrsCode {
    /// WGS84 Geographic (lon/lat in degrees)
    Epsg4326,
    /// NAD83 Geographic, treated as WGS84 for transforms
    Epsg4269,
    /// Web Mercator (meters)
    Epsg3857,
    /// CONUS Albers Equal Area (meters), used by US census layers
    Epsg5070,
}

impl CrsCode {
    /// Parse a CRS string.
    ///
    /// Accepts formats like:
    /// - "EPSG:4326" / "epsg:4326"
    /// - "CRS:84" (lon/lat WGS84)
    /// - "urn:ogc:def:crs:EPSG::4326" (GeoJSON named CRS)
    /// - "urn:ogc:def:crs:OGC:1.3:CRS84"
    pub fn parse(s: &str) -> Result<Self, CrsParseError> {
        let normalized = s.trim().to_uppercase();

        if normalized == "CRS:84" || normalized.ends_with(":CRS84") {
            return Ok(CrsCode::Epsg4326);
        }

        let code = normalized
            .rsplit(':')
            .next()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| CrsParseError::UnsupportedCrs(s.to_string()))?;

        if !normalized.contains("EPSG") {
            return Err(CrsParseError::UnsupportedCrs(s.to_string()));
        }

        match code {
            "4326" => Ok(CrsCode::Epsg4326),
            "4269" => Ok(CrsCode::Epsg4269),
            "3857" | "900913" => Ok(CrsCode::Epsg3857),
            "5070" => Ok(CrsCode::Epsg5070),
            _ => Err(CrsParseError::UnsupportedCrs(s.to_string())),
        }
    }

    /// Numeric EPSG code.
    pub fn epsg(&self) -> u32 {
        match self {
            CrsCode::Epsg4326 => 4326,
            CrsCode::Epsg4269 => 4269,
            CrsCode::Epsg3857 => 3857,
            CrsCode::Epsg5070 => 5070,
        }
    }

    /// Check if this is a geographic (lat/lon) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self, CrsCode::Epsg4326 | CrsCode::Epsg4269)
    }

    /// GeoJSON named-CRS URN, e.g. `urn:ogc:def:crs:EPSG::4326`.
    pub fn urn(&self) -> String {
        format!("urn:ogc:def:crs:EPSG::{}", self.epsg())
    }

    /// ESRI-style WKT used for `.prj` sidecar files.
    pub fn esri_wkt(&self) -> &'static str {
        match self {
            CrsCode::Epsg4326 => concat!(
                r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984","#,
                r#"SPHEROID["WGS_1984",6378137.0,298.257223563]],"#,
                r#"PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#
            ),
            CrsCode::Epsg4269 => concat!(
                r#"GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983","#,
                r#"SPHEROID["GRS_1980",6378137.0,298.257222101]],"#,
                r#"PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#
            ),
            CrsCode::Epsg3857 => concat!(
                r#"PROJCS["WGS_1984_Web_Mercator_Auxiliary_Sphere","#,
                r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984","#,
                r#"SPHEROID["WGS_1984",6378137.0,298.257223563]],"#,
                r#"PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],"#,
                r#"PROJECTION["Mercator_Auxiliary_Sphere"],PARAMETER["False_Easting",0.0],"#,
                r#"PARAMETER["False_Northing",0.0],PARAMETER["Central_Meridian",0.0],"#,
                r#"PARAMETER["Standard_Parallel_1",0.0],PARAMETER["Auxiliary_Sphere_Type",0.0],"#,
                r#"UNIT["Meter",1.0]]"#
            ),
            CrsCode::Epsg5070 => concat!(
                r#"PROJCS["NAD_1983_Contiguous_USA_Albers","#,
                r#"GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983","#,
                r#"SPHEROID["GRS_1980",6378137.0,298.257222101]],"#,
                r#"PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],"#,
                r#"PROJECTION["Albers"],PARAMETER["False_Easting",0.0],"#,
                r#"PARAMETER["False_Northing",0.0],PARAMETER["Central_Meridian",-96.0],"#,
                r#"PARAMETER["Standard_Parallel_1",29.5],PARAMETER["Standard_Parallel_2",45.5],"#,
                r#"PARAMETER["Latitude_Of_Origin",23.0],UNIT["Meter",1.0]]"#
            ),
        }
    }
}

impl Default for CrsCode {
    fn default() -> Self {
        CrsCode::Epsg4326
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for CrsCode {
    type Err = CrsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CrsCode::parse(s)
    }
}

impl Serialize for CrsCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CrsCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CrsCode::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crs() {
        assert_eq!(CrsCode::parse("EPSG:4326").unwrap(), CrsCode::Epsg4326);
        assert_eq!(CrsCode::parse("epsg:3857").unwrap(), CrsCode::Epsg3857);
        assert_eq!(CrsCode::parse("CRS:84").unwrap(), CrsCode::Epsg4326);
        assert_eq!(
            CrsCode::parse("urn:ogc:def:crs:EPSG::5070").unwrap(),
            CrsCode::Epsg5070
        );
        assert_eq!(
            CrsCode::parse("urn:ogc:def:crs:OGC:1.3:CRS84").unwrap(),
            CrsCode::Epsg4326
        );
        assert!(CrsCode::parse("EPSG:99999").is_err());
        assert!(CrsCode::parse("4326").is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for code in [
            CrsCode::Epsg4326,
            CrsCode::Epsg4269,
            CrsCode::Epsg3857,
            CrsCode::Epsg5070,
        ] {
            assert_eq!(code.to_string().parse::<CrsCode>().unwrap(), code);
        }
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&CrsCode::Epsg3857).unwrap();
        assert_eq!(json, "\"EPSG:3857\"");
        let back: CrsCode = serde_json::from_str("\"epsg:5070\"").unwrap();
        assert_eq!(back, CrsCode::Epsg5070);
    }

    #[test]
    fn test_geographic() {
        assert!(CrsCode::Epsg4326.is_geographic());
        assert!(!CrsCode::Epsg5070.is_geographic());
    }
}
