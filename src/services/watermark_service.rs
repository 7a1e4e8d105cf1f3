use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::ExtractionConfig;
use crate::errors::AppError;
use crate::models::SeriesKey;
use crate::store::SeriesStore;

/// How to start a series that has no stored data yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkMode {
    /// Routine run: look back a short default interval.
    Daily,
    /// Historical load: start at the configured historical date.
    Backfill,
}

/// Resolves where extraction for a series should resume. Read-only.
#[derive(Clone)]
pub struct WatermarkService {
    store: Arc<dyn SeriesStore>,
}

impl WatermarkService {
    pub fn new(store: Arc<dyn SeriesStore>) -> Self {
        Self { store }
    }

    /// Latest stored timestamp for `key`, inclusive, or the mode's fallback.
    pub async fn resolve(
        &self,
        key: &SeriesKey,
        mode: WatermarkMode,
        settings: &ExtractionConfig,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, AppError> {
        if let Some(latest) = self.store.latest_timestamp(key).await? {
            debug!("{}: resuming from stored watermark {}", key, latest);
            return Ok(latest);
        }

        let fallback = match mode {
            WatermarkMode::Daily => now - settings.default_lookback,
            WatermarkMode::Backfill => settings.historical_start,
        };
        debug!("{}: no stored data, starting from {} ({:?})", key, fallback, mode);
        Ok(fallback)
    }
}
