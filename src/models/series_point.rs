use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which upstream source a series comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Price,
    Weather,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Price => "price",
            SourceKind::Weather => "weather",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "price" => Ok(SourceKind::Price),
            "weather" => Ok(SourceKind::Weather),
            other => Err(format!("unknown source kind '{}'", other)),
        }
    }
}

/// Identifies one independent time series, e.g. `price:DE-LU`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub source_kind: SourceKind,
    pub zone_id: String,
}

impl SeriesKey {
    pub fn new(source_kind: SourceKind, zone_id: impl Into<String>) -> Self {
        Self {
            source_kind,
            zone_id: zone_id.into(),
        }
    }

    pub fn price(zone_id: impl Into<String>) -> Self {
        Self::new(SourceKind::Price, zone_id)
    }

    pub fn weather(zone_id: impl Into<String>) -> Self {
        Self::new(SourceKind::Weather, zone_id)
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source_kind, self.zone_id)
    }
}

// A single stored observation. Identity is (timestamp, series_key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub series_key: SeriesKey,
    pub value_fields: BTreeMap<String, f64>,
}

impl SeriesPoint {
    pub fn new(timestamp: DateTime<Utc>, series_key: SeriesKey) -> Self {
        Self {
            timestamp,
            series_key,
            value_fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: f64) -> Self {
        self.value_fields.insert(name.to_string(), value);
        self
    }

    pub fn field(&self, name: &str) -> Option<f64> {
        self.value_fields.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_series_key_display() {
        assert_eq!(SeriesKey::price("DE-LU").to_string(), "price:DE-LU");
        assert_eq!(SeriesKey::weather("52.52,13.41").to_string(), "weather:52.52,13.41");
    }

    #[test]
    fn test_source_kind_parse() {
        assert_eq!("Price".parse::<SourceKind>().unwrap(), SourceKind::Price);
        assert_eq!(" weather ".parse::<SourceKind>().unwrap(), SourceKind::Weather);
        assert!("gas".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_point_field_lookup() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let point = SeriesPoint::new(ts, SeriesKey::price("DE-LU")).with_field("price", 50.0);
        assert_eq!(point.field("price"), Some(50.0));
        assert_eq!(point.field("temperature"), None);
    }
}
