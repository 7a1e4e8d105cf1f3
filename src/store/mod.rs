//! Persistence for the price and weather series.
//!
//! `SeriesStore` is the only surface the pipeline talks to. The Postgres
//! implementation backs production runs; the in-memory one backs tests and
//! dry runs.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::AppError;
use crate::models::{SeriesKey, SeriesPoint};

pub mod memory;
pub mod postgres;

pub use memory::MemorySeriesStore;
pub use postgres::PgSeriesStore;

#[async_trait]
pub trait SeriesStore: Send + Sync {
    /// Latest stored timestamp for a series, if any.
    async fn latest_timestamp(&self, key: &SeriesKey) -> Result<Option<DateTime<Utc>>, AppError>;

    /// Subset of `timestamps` already stored for `key`.
    async fn existing_timestamps(
        &self,
        key: &SeriesKey,
        timestamps: &[DateTime<Utc>],
    ) -> Result<HashSet<DateTime<Utc>>, AppError>;

    /// Insert points, ignoring any whose identity already exists. Returns rows inserted.
    async fn insert_many(&self, points: &[SeriesPoint]) -> Result<u64, AppError>;

    /// Up to `limit` points strictly after `after`, ordered by timestamp ascending.
    async fn scan_page(
        &self,
        key: &SeriesKey,
        after: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<SeriesPoint>, AppError>;

    /// All points with `from <= timestamp <= to`, ordered by timestamp ascending.
    async fn scan_range(
        &self,
        key: &SeriesKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SeriesPoint>, AppError>;

    async fn count(&self, key: &SeriesKey) -> Result<u64, AppError>;
}
