//! Turns raw upstream bodies into `SeriesPoint`s.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::errors::AppError;
use crate::external::series_fetcher::RawPayload;
use crate::models::{SeriesKey, SeriesPoint, SourceKind, PRICE_FIELD, PRICE_UNIT};

/// Open-Meteo hourly variable -> stored field name.
pub const OPEN_METEO_FIELDS: [(&str, &str); 11] = [
    ("temperature_2m", "temperature"),
    ("relative_humidity_2m", "humidity"),
    ("precipitation", "precipitation"),
    ("rain", "rain"),
    ("snowfall", "snowfall"),
    ("surface_pressure", "surface_pressure"),
    ("cloud_cover", "cloud_cover"),
    ("wind_speed_10m", "wind_speed_10m"),
    ("wind_speed_100m", "wind_speed_100m"),
    ("wind_direction_10m", "wind_direction_10m"),
    ("wind_direction_100m", "wind_direction_100m"),
];

#[derive(Debug, Deserialize)]
struct PriceBody {
    unix_seconds: Option<Vec<i64>>,
    price: Option<Vec<Option<f64>>>,
    unit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WeatherBody {
    hourly: Option<HourlyBlock>,
}

#[derive(Debug, Deserialize)]
struct HourlyBlock {
    time: Option<Vec<String>>,
    #[serde(flatten)]
    series: HashMap<String, Vec<Option<f64>>>,
}

/// Decode a fetched window. Structural problems are `MalformedBatch`;
/// null values become absent fields and rows with nothing left are dropped.
pub fn decode(payload: RawPayload) -> Result<Vec<SeriesPoint>, AppError> {
    let key = payload.series_key;
    match key.source_kind {
        SourceKind::Price => decode_price(&key, payload.body),
        SourceKind::Weather => decode_weather(&key, payload.body),
    }
}

fn decode_price(key: &SeriesKey, body: serde_json::Value) -> Result<Vec<SeriesPoint>, AppError> {
    let body: PriceBody = serde_json::from_value(body)
        .map_err(|e| AppError::MalformedBatch(format!("{}: unexpected price payload: {}", key, e)))?;

    let timestamps = body
        .unix_seconds
        .ok_or_else(|| AppError::MalformedBatch(format!("{}: missing 'unix_seconds'", key)))?;
    let prices = body
        .price
        .ok_or_else(|| AppError::MalformedBatch(format!("{}: missing 'price'", key)))?;
    check_len(key, "price", timestamps.len(), prices.len())?;

    if let Some(unit) = &body.unit {
        check_unit(key, unit)?;
        debug!("{}: {} prices in {}", key, prices.len(), unit);
    }

    let mut points = Vec::with_capacity(timestamps.len());
    for (secs, price) in timestamps.into_iter().zip(prices) {
        let ts = DateTime::<Utc>::from_timestamp(secs, 0)
            .ok_or_else(|| AppError::MalformedBatch(format!("{}: timestamp {} out of range", key, secs)))?;
        if let Some(price) = price {
            points.push(SeriesPoint::new(ts, key.clone()).with_field(PRICE_FIELD, price));
        }
    }
    Ok(points)
}

/// Prices are stored as bare numbers, so a window quoted in any other unit
/// cannot be mixed into the series.
fn check_unit(key: &SeriesKey, unit: &str) -> Result<(), AppError> {
    let normalised: String = unit.chars().filter(|c| !c.is_whitespace()).collect();
    if normalised.eq_ignore_ascii_case(PRICE_UNIT) {
        Ok(())
    } else {
        Err(AppError::MalformedBatch(format!(
            "{}: prices quoted in '{}', expected {}",
            key, unit, PRICE_UNIT
        )))
    }
}

fn decode_weather(key: &SeriesKey, body: serde_json::Value) -> Result<Vec<SeriesPoint>, AppError> {
    let body: WeatherBody = serde_json::from_value(body)
        .map_err(|e| AppError::MalformedBatch(format!("{}: unexpected weather payload: {}", key, e)))?;
    let hourly = body
        .hourly
        .ok_or_else(|| AppError::MalformedBatch(format!("{}: missing 'hourly'", key)))?;
    let times = hourly
        .time
        .ok_or_else(|| AppError::MalformedBatch(format!("{}: missing 'hourly.time'", key)))?;

    let mut columns = Vec::with_capacity(OPEN_METEO_FIELDS.len());
    for (upstream, field) in OPEN_METEO_FIELDS {
        let values = hourly
            .series
            .get(upstream)
            .ok_or_else(|| AppError::MalformedBatch(format!("{}: missing 'hourly.{}'", key, upstream)))?;
        check_len(key, upstream, times.len(), values.len())?;
        columns.push((field, values));
    }

    let mut points = Vec::with_capacity(times.len());
    for (i, raw) in times.iter().enumerate() {
        let ts = parse_hour(raw)
            .ok_or_else(|| AppError::MalformedBatch(format!("{}: bad timestamp '{}'", key, raw)))?;
        let value_fields: BTreeMap<String, f64> = columns
            .iter()
            .filter_map(|(field, values)| values[i].map(|v| (field.to_string(), v)))
            .collect();
        if !value_fields.is_empty() {
            points.push(SeriesPoint {
                timestamp: ts,
                series_key: key.clone(),
                value_fields,
            });
        }
    }
    Ok(points)
}

fn check_len(key: &SeriesKey, field: &str, expected: usize, actual: usize) -> Result<(), AppError> {
    if expected != actual {
        return Err(AppError::MalformedBatch(format!(
            "{}: '{}' has {} values for {} timestamps",
            key, field, actual, expected
        )));
    }
    Ok(())
}

// Open-Meteo returns naive GMT hours such as `2024-01-01T00:00`.
fn parse_hour(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}
