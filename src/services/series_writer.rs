use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::errors::AppError;
use crate::models::{SeriesKey, SeriesPoint};
use crate::store::SeriesStore;

const INSERT_CHUNK: usize = 1_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub received: usize,
    pub inserted: usize,
    pub duplicates: usize,
}

/// Idempotent writer: a point is stored at most once per (timestamp, series key).
#[derive(Clone)]
pub struct SeriesWriter {
    store: Arc<dyn SeriesStore>,
}

impl SeriesWriter {
    pub fn new(store: Arc<dyn SeriesStore>) -> Self {
        Self { store }
    }

    /// Persist the novel subset of `points`. The batch is validated as a whole
    /// first, so a `MalformedBatch` error means nothing was written.
    pub async fn write(&self, points: &[SeriesPoint]) -> Result<WriteSummary, AppError> {
        if points.is_empty() {
            return Ok(WriteSummary::default());
        }
        validate_batch(points)?;

        let mut by_key: BTreeMap<&SeriesKey, Vec<&SeriesPoint>> = BTreeMap::new();
        for p in points {
            by_key.entry(&p.series_key).or_default().push(p);
        }

        let mut inserted = 0;
        for (key, group) in by_key {
            let timestamps: Vec<_> = group.iter().map(|p| p.timestamp).collect();
            let existing = self.store.existing_timestamps(key, &timestamps).await?;

            let mut seen = HashSet::with_capacity(group.len());
            let novel: Vec<SeriesPoint> = group
                .into_iter()
                .filter(|p| !existing.contains(&p.timestamp) && seen.insert(p.timestamp))
                .cloned()
                .collect();

            for chunk in novel.chunks(INSERT_CHUNK) {
                inserted += self.store.insert_many(chunk).await? as usize;
            }
            debug!("{}: {} novel of {} received", key, novel.len(), timestamps.len());
        }

        let summary = WriteSummary {
            received: points.len(),
            inserted,
            duplicates: points.len() - inserted,
        };
        if summary.inserted > 0 {
            info!("Inserted {} point(s), {} duplicate(s) skipped", summary.inserted, summary.duplicates);
        } else {
            info!("No new points to insert ({} duplicate(s))", summary.duplicates);
        }
        Ok(summary)
    }
}

fn validate_batch(points: &[SeriesPoint]) -> Result<(), AppError> {
    for p in points {
        if p.value_fields.is_empty() {
            return Err(AppError::MalformedBatch(format!(
                "{} point at {} has no value fields",
                p.series_key, p.timestamp
            )));
        }
        if let Some((name, value)) = p.value_fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(AppError::MalformedBatch(format!(
                "{} point at {} has non-finite '{}' = {}",
                p.series_key, p.timestamp, name, value
            )));
        }
    }
    Ok(())
}
