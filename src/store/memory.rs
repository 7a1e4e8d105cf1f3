use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::errors::AppError;
use crate::models::{SeriesKey, SeriesPoint};
use crate::store::SeriesStore;

/// In-process store. Each series lives under its own map entry, so writers
/// for different keys never contend.
#[derive(Clone, Default)]
pub struct MemorySeriesStore {
    series: Arc<DashMap<SeriesKey, BTreeMap<DateTime<Utc>, SeriesPoint>>>,
}

impl MemorySeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored point for a key, oldest first.
    pub fn snapshot(&self, key: &SeriesKey) -> Vec<SeriesPoint> {
        self.series
            .get(key)
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SeriesStore for MemorySeriesStore {
    async fn latest_timestamp(&self, key: &SeriesKey) -> Result<Option<DateTime<Utc>>, AppError> {
        Ok(self
            .series
            .get(key)
            .and_then(|s| s.keys().next_back().copied()))
    }

    async fn existing_timestamps(
        &self,
        key: &SeriesKey,
        timestamps: &[DateTime<Utc>],
    ) -> Result<HashSet<DateTime<Utc>>, AppError> {
        let Some(series) = self.series.get(key) else {
            return Ok(HashSet::new());
        };
        Ok(timestamps
            .iter()
            .filter(|ts| series.contains_key(ts))
            .copied()
            .collect())
    }

    async fn insert_many(&self, points: &[SeriesPoint]) -> Result<u64, AppError> {
        let mut inserted = 0;
        for point in points {
            let mut series = self.series.entry(point.series_key.clone()).or_default();
            if !series.contains_key(&point.timestamp) {
                series.insert(point.timestamp, point.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn scan_page(
        &self,
        key: &SeriesKey,
        after: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<SeriesPoint>, AppError> {
        let Some(series) = self.series.get(key) else {
            return Ok(Vec::new());
        };
        let lower = match after {
            Some(ts) => Bound::Excluded(ts),
            None => Bound::Unbounded,
        };
        Ok(series
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn scan_range(
        &self,
        key: &SeriesKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SeriesPoint>, AppError> {
        if from > to {
            return Ok(Vec::new());
        }
        let Some(series) = self.series.get(key) else {
            return Ok(Vec::new());
        };
        Ok(series.range(from..=to).map(|(_, p)| p.clone()).collect())
    }

    async fn count(&self, key: &SeriesKey) -> Result<u64, AppError> {
        Ok(self.series.get(key).map(|s| s.len() as u64).unwrap_or(0))
    }
}
