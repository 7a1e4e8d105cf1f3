use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use crate::errors::AppError;
use crate::models::{SeriesKey, SourceKind, TrainingMode};

/// Upper bound for a request window.
pub const MAX_WINDOW_DAYS: i64 = 366;
/// Upper bound for the empty-series look-back.
pub const MAX_LOOKBACK_DAYS: i64 = 36_500;

/// Per-source extraction settings.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Width of one request window.
    pub window: Duration,
    /// Pause between windows.
    pub pacing: std::time::Duration,
    /// Total fetch attempts per window before it is skipped.
    pub max_attempts: u32,
    /// Fixed delay between attempts of the same window.
    pub retry_delay: std::time::Duration,
    /// Start date for backfill runs on an empty series.
    pub historical_start: DateTime<Utc>,
    /// Look-back for routine runs on an empty series.
    pub default_lookback: Duration,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub database_url: Option<String>,
    pub country: String,
    pub bidding_zone: String,
    pub energy_charts_url: String,
    pub meteo_api_url: String,
    pub meteo_latitude: f64,
    pub meteo_longitude: f64,
    pub price_extraction: ExtractionConfig,
    pub weather_extraction: ExtractionConfig,
    pub model_path: PathBuf,
    pub batch_size: usize,
    pub training_mode: TrainingMode,
    pub model_seed: u64,
    pub model_epochs: usize,
    pub feature_epoch: DateTime<Utc>,
    pub extraction_interval_secs: u64,
    pub training_interval_secs: u64,
    pub server_addr: String,
    pub evaluation_sample_size: usize,
}

impl PipelineConfig {
    /// Read configuration from the process environment (after loading `.env`).
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let max_attempts: u32 = env_or("MAX_RETRIES", 3)?;
        let retry_delay = std::time::Duration::from_secs(env_or("RETRY_DELAY_SECS", 5)?);
        let default_lookback = env_days("DEFAULT_LOOKBACK_DAYS", 1, MAX_LOOKBACK_DAYS)?;

        let config = Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            country: env_string("COUNTRY", "de"),
            bidding_zone: env_string("BIDDING_ZONE", "DE-LU"),
            energy_charts_url: env_string("ENERGY_CHARTS_URL", "https://api.energy-charts.info/"),
            meteo_api_url: env_string("METEO_API_URL", "https://archive-api.open-meteo.com/v1/archive"),
            meteo_latitude: env_or("METEO_LATITUDE", 52.52)?,
            meteo_longitude: env_or("METEO_LONGITUDE", 13.41)?,
            price_extraction: ExtractionConfig {
                window: env_days("DAYS_PER_REQUEST", 7, MAX_WINDOW_DAYS)?,
                pacing: std::time::Duration::from_secs(env_or("SLEEP_TIME", 5)?),
                max_attempts,
                retry_delay,
                historical_start: env_date("HISTORICAL_START_DATE", "2016-01-01")?,
                default_lookback,
            },
            weather_extraction: ExtractionConfig {
                window: env_days("METEO_DAYS_PER_REQUEST", 30, MAX_WINDOW_DAYS)?,
                pacing: std::time::Duration::from_secs(env_or("METEO_SLEEP_TIME", 10)?),
                max_attempts,
                retry_delay,
                historical_start: env_date("METEO_HISTORICAL_START_DATE", "2016-01-01")?,
                default_lookback,
            },
            model_path: PathBuf::from(env_string("MODEL_PATH", "models/energy_price_model.json")),
            batch_size: env_or("BATCH_SIZE", 50_000)?,
            training_mode: env_or("TRAINING_MODE", TrainingMode::Full)?,
            model_seed: env_or("MODEL_SEED", 42)?,
            model_epochs: env_or("MODEL_EPOCHS", 30)?,
            feature_epoch: env_date("FEATURE_EPOCH", "2016-01-01")?,
            extraction_interval_secs: env_or("EXTRACTION_INTERVAL", 3600)?,
            training_interval_secs: env_or("TRAINING_INTERVAL", 86_400)?,
            server_addr: env_string("SERVER_ADDR", "0.0.0.0:8000"),
            evaluation_sample_size: env_or("EVALUATION_SAMPLE_SIZE", 500)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        for (name, extraction) in [("price", &self.price_extraction), ("weather", &self.weather_extraction)] {
            if extraction.window <= Duration::zero() || extraction.window > Duration::days(MAX_WINDOW_DAYS) {
                return Err(AppError::Config(format!(
                    "{} request window must be between 1 and {} days",
                    name, MAX_WINDOW_DAYS
                )));
            }
            if extraction.max_attempts == 0 {
                return Err(AppError::Config("MAX_RETRIES must be at least 1".into()));
            }
            if extraction.default_lookback <= Duration::zero()
                || extraction.default_lookback > Duration::days(MAX_LOOKBACK_DAYS)
            {
                return Err(AppError::Config(format!(
                    "DEFAULT_LOOKBACK_DAYS must be between 1 and {}",
                    MAX_LOOKBACK_DAYS
                )));
            }
        }
        if self.batch_size == 0 {
            return Err(AppError::Config("BATCH_SIZE must be at least 1".into()));
        }
        if self.model_epochs == 0 {
            return Err(AppError::Config("MODEL_EPOCHS must be at least 1".into()));
        }
        if self.extraction_interval_secs == 0 || self.training_interval_secs == 0 {
            return Err(AppError::Config("job intervals must be at least one second".into()));
        }
        url::Url::parse(&self.energy_charts_url)
            .map_err(|e| AppError::Config(format!("ENERGY_CHARTS_URL is not a valid URL: {}", e)))?;
        url::Url::parse(&self.meteo_api_url)
            .map_err(|e| AppError::Config(format!("METEO_API_URL is not a valid URL: {}", e)))?;
        Ok(())
    }

    pub fn price_key(&self) -> SeriesKey {
        SeriesKey::price(self.bidding_zone.clone())
    }

    /// Weather series are keyed by the observed location.
    pub fn weather_key(&self) -> SeriesKey {
        SeriesKey::weather(format!("{},{}", self.meteo_latitude, self.meteo_longitude))
    }

    pub fn extraction_for(&self, kind: SourceKind) -> &ExtractionConfig {
        match kind {
            SourceKind::Price => &self.price_extraction,
            SourceKind::Weather => &self.weather_extraction,
        }
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_or<T>(name: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| AppError::Config(format!("invalid value for {}: '{}' ({})", name, raw, e))),
        _ => Ok(default),
    }
}

fn env_days(name: &str, default: i64, max: i64) -> Result<Duration, AppError> {
    let days: i64 = env_or(name, default)?;
    if !(1..=max).contains(&days) {
        return Err(AppError::Config(format!(
            "{} must be between 1 and {} days, got {}",
            name, max, days
        )));
    }
    Ok(Duration::days(days))
}

fn env_date(name: &str, default: &str) -> Result<DateTime<Utc>, AppError> {
    let raw = env_string(name, default);
    parse_date(&raw).map_err(|e| AppError::Config(format!("invalid value for {}: {}", name, e)))
}

/// Accepts `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
pub fn parse_date(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| format!("'{}' has no midnight", raw))?;
        return Ok(Utc.from_utc_datetime(&midnight));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("'{}' is neither YYYY-MM-DD nor RFC 3339 ({})", raw, e))
}

#[cfg(test)]
pub(crate) fn test_config() -> PipelineConfig {
    let extraction = ExtractionConfig {
        window: Duration::days(7),
        pacing: std::time::Duration::ZERO,
        max_attempts: 3,
        retry_delay: std::time::Duration::ZERO,
        historical_start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        default_lookback: Duration::days(1),
    };
    PipelineConfig {
        database_url: None,
        country: "de".into(),
        bidding_zone: "DE-LU".into(),
        energy_charts_url: "https://api.energy-charts.info/".into(),
        meteo_api_url: "https://archive-api.open-meteo.com/v1/archive".into(),
        meteo_latitude: 52.52,
        meteo_longitude: 13.41,
        price_extraction: extraction.clone(),
        weather_extraction: ExtractionConfig {
            window: Duration::days(30),
            ..extraction
        },
        model_path: PathBuf::from("models/test_model.json"),
        batch_size: 10,
        training_mode: TrainingMode::Full,
        model_seed: 42,
        model_epochs: 30,
        feature_epoch: Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap(),
        extraction_interval_secs: 3600,
        training_interval_secs: 86_400,
        server_addr: "127.0.0.1:0".into(),
        evaluation_sample_size: 500,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_formats() {
        let day = parse_date("2016-01-01").unwrap();
        assert_eq!(day, Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap());
        let ts = parse_date("2024-03-01T12:00:00+01:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap());
        assert!(parse_date("yesterday").is_err());
    }

    #[test]
    fn test_series_keys() {
        let config = test_config();
        assert_eq!(config.price_key().to_string(), "price:DE-LU");
        assert_eq!(config.weather_key().to_string(), "weather:52.52,13.41");
        assert_eq!(config.extraction_for(SourceKind::Weather).window, Duration::days(30));
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let mut config = test_config();
        config.batch_size = 0;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let mut config = test_config();
        config.price_extraction.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_out_of_range_day_counts_are_config_errors() {
        std::env::set_var("ENERGY_PIPELINE_TEST_WINDOW_DAYS", "9223372036854775807");
        let err = env_days("ENERGY_PIPELINE_TEST_WINDOW_DAYS", 7, MAX_WINDOW_DAYS).unwrap_err();
        assert!(matches!(err, AppError::Config(ref m) if m.contains("ENERGY_PIPELINE_TEST_WINDOW_DAYS")));

        std::env::set_var("ENERGY_PIPELINE_TEST_LOOKBACK_DAYS", "0");
        assert!(env_days("ENERGY_PIPELINE_TEST_LOOKBACK_DAYS", 1, MAX_LOOKBACK_DAYS).is_err());

        assert_eq!(
            env_days("ENERGY_PIPELINE_TEST_UNSET_DAYS", 30, MAX_WINDOW_DAYS).unwrap(),
            Duration::days(30)
        );
    }

    #[test]
    fn test_validate_rejects_oversized_window() {
        let mut config = test_config();
        config.weather_extraction.window = Duration::days(MAX_WINDOW_DAYS + 1);
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(test_config().validate().is_ok());
    }
}
