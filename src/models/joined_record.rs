use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the label field on price points.
pub const PRICE_FIELD: &str = "price";

/// Unit of stored prices and of served predictions.
pub const PRICE_UNIT: &str = "EUR/MWh";

/// Weather fields joined onto each price row, in feature-vector order.
pub const WEATHER_FIELDS: [&str; 11] = [
    "temperature",
    "humidity",
    "precipitation",
    "rain",
    "snowfall",
    "surface_pressure",
    "cloud_cover",
    "wind_speed_10m",
    "wind_speed_100m",
    "wind_direction_10m",
    "wind_direction_100m",
];

pub const DAYS_SINCE_EPOCH: &str = "days_since_epoch";

/// Full feature vector contract shared by training and serving.
pub const FEATURE_NAMES: [&str; 12] = [
    "temperature",
    "humidity",
    "precipitation",
    "rain",
    "snowfall",
    "surface_pressure",
    "cloud_cover",
    "wind_speed_10m",
    "wind_speed_100m",
    "wind_direction_10m",
    "wind_direction_100m",
    DAYS_SINCE_EPOCH,
];

pub const FEATURE_DIM: usize = FEATURE_NAMES.len();

/// One supervised row: a price label with the weather observed at the same instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRecord {
    pub timestamp: DateTime<Utc>,
    pub label: f64,
    pub features: [f64; 11],
    pub days_since_epoch: i64,
}

impl JoinedRecord {
    /// Feature row in `FEATURE_NAMES` order.
    pub fn feature_row(&self) -> [f64; FEATURE_DIM] {
        let mut row = [0.0; FEATURE_DIM];
        row[..11].copy_from_slice(&self.features);
        row[11] = self.days_since_epoch as f64;
        row
    }

    /// Per-sample recency weight; later days weigh more, the epoch day weighs 1.
    pub fn recency_weight(&self) -> f64 {
        (self.days_since_epoch.max(0) + 1) as f64
    }
}

/// Whole days elapsed since `epoch`, floored so the value never decreases with time.
pub fn days_since_epoch(timestamp: DateTime<Utc>, epoch: DateTime<Utc>) -> i64 {
    (timestamp - epoch).num_seconds().div_euclid(86_400)
}
