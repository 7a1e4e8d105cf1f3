use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::AppError;
use crate::models::SeriesKey;
use crate::store::SeriesStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesStats {
    pub series: String,
    pub rows: u64,
    pub latest: Option<DateTime<Utc>>,
}

pub async fn collect(store: &dyn SeriesStore, keys: &[SeriesKey]) -> Result<Vec<SeriesStats>, AppError> {
    let mut stats = Vec::with_capacity(keys.len());
    for key in keys {
        stats.push(SeriesStats {
            series: key.to_string(),
            rows: store.count(key).await?,
            latest: store.latest_timestamp(key).await?,
        });
    }
    Ok(stats)
}
