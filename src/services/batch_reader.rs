//! Paged inner join of the price and weather series.
//!
//! Pages are keyed on the price timestamp, so memory per step is bounded by
//! `page_size` price rows plus the weather rows in the same span.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::Stream;
use tracing::debug;

use crate::errors::AppError;
use crate::models::{days_since_epoch, JoinedRecord, SeriesKey, SeriesPoint, PRICE_FIELD, WEATHER_FIELDS};
use crate::store::SeriesStore;

pub struct BatchReader {
    store: Arc<dyn SeriesStore>,
    price_key: SeriesKey,
    weather_key: SeriesKey,
    page_size: usize,
    epoch: DateTime<Utc>,
    cursor: Option<DateTime<Utc>>,
    exhausted: bool,
}

impl BatchReader {
    pub fn new(
        store: Arc<dyn SeriesStore>,
        price_key: SeriesKey,
        weather_key: SeriesKey,
        page_size: usize,
        epoch: DateTime<Utc>,
    ) -> Self {
        Self {
            store,
            price_key,
            weather_key,
            page_size: page_size.max(1),
            epoch,
            cursor: None,
            exhausted: false,
        }
    }

    /// Next joined page. `Ok(None)` once the price series is exhausted, and on
    /// every call after that. A page can be empty when nothing in it matched.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<JoinedRecord>>, AppError> {
        if self.exhausted {
            return Ok(None);
        }

        let prices = self
            .store
            .scan_page(&self.price_key, self.cursor, self.page_size)
            .await?;
        let (Some(first), Some(last)) = (prices.first(), prices.last()) else {
            self.exhausted = true;
            return Ok(None);
        };
        let (first_ts, last_ts) = (first.timestamp, last.timestamp);
        self.cursor = Some(last_ts);

        let weather = self
            .store
            .scan_range(&self.weather_key, first_ts, last_ts)
            .await?;
        let weather_at: HashMap<DateTime<Utc>, &SeriesPoint> =
            weather.iter().map(|w| (w.timestamp, w)).collect();

        let batch: Vec<JoinedRecord> = prices
            .iter()
            .filter_map(|p| {
                let label = p.field(PRICE_FIELD)?;
                let observed = weather_at.get(&p.timestamp)?;
                join_row(p.timestamp, label, observed, self.epoch)
            })
            .collect();

        debug!(
            "Joined {} of {} price row(s) in [{}, {}]",
            batch.len(),
            prices.len(),
            first_ts,
            last_ts
        );
        Ok(Some(batch))
    }

    /// Consume the reader as a stream of pages.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<JoinedRecord>, AppError>> + Send {
        futures::stream::unfold(self, |mut reader| async move {
            match reader.next_batch().await {
                Ok(Some(batch)) => Some((Ok(batch), reader)),
                Ok(None) => None,
                Err(e) => {
                    reader.exhausted = true;
                    Some((Err(e), reader))
                }
            }
        })
    }
}

fn join_row(
    timestamp: DateTime<Utc>,
    label: f64,
    weather: &SeriesPoint,
    epoch: DateTime<Utc>,
) -> Option<JoinedRecord> {
    let mut features = [0.0; WEATHER_FIELDS.len()];
    for (slot, name) in features.iter_mut().zip(WEATHER_FIELDS) {
        *slot = weather.field(name)?;
    }
    Some(JoinedRecord {
        timestamp,
        label,
        features,
        days_since_epoch: days_since_epoch(timestamp, epoch),
    })
}
