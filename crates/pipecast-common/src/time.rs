//! Forecast keys: which run date, lead time and ensemble member a piece of
//! data belongs to.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one ensemble member (e.g. `hrrr`, `gfs`, `m03`).
///
/// Member ids appear in file names, so only ASCII alphanumerics, `-` and
/// `_` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemberId(String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.is_empty() {
            return Err("member id must not be empty".to_string());
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(format!(
                "member id '{}' may only contain ASCII letters, digits, '-' and '_'",
                id
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MemberId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        MemberId::new(value)
    }
}

impl From<MemberId> for String {
    fn from(id: MemberId) -> Self {
        id.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A (date, forecast hour, member) tuple: the unit of independent work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ForecastKey {
    pub date: NaiveDate,
    pub hour: u32,
    pub member: MemberId,
}

impl ForecastKey {
    pub fn new(date: NaiveDate, hour: u32, member: MemberId) -> Self {
        Self { date, hour, member }
    }

    /// `F06` style lead-time label.
    pub fn hour_label(&self) -> String {
        hour_label(self.hour)
    }

    /// `YYYY-MM-DD`.
    pub fn date_label(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for ForecastKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.date_label(), self.hour_label(), self.member)
    }
}

/// Format a forecast hour as `F<hh>` with at least two digits.
pub fn hour_label(hour: u32) -> String {
    format!("F{:02}", hour)
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_id_validation() {
        assert!(MemberId::new("hrrr").is_ok());
        assert!(MemberId::new("m_03-b").is_ok());
        assert!(MemberId::new("").is_err());
        assert!(MemberId::new("a/b").is_err());
        assert!(MemberId::new("a b").is_err());
    }

    #[test]
    fn test_forecast_key_display() {
        let key = ForecastKey::new(
            parse_date("2024-07-01").unwrap(),
            6,
            MemberId::new("gfs").unwrap(),
        );
        assert_eq!(key.to_string(), "2024-07-01/F06/gfs");
        assert_eq!(key.hour_label(), "F06");
        assert_eq!(hour_label(120), "F120");
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert!(parse_date("2024-13-01").is_err());
        assert!(parse_date("20240101").is_err());
    }
}
