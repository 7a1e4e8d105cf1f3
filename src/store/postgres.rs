use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::db::series_queries;
use crate::errors::AppError;
use crate::models::{SeriesKey, SeriesPoint};
use crate::store::SeriesStore;

#[derive(Clone)]
pub struct PgSeriesStore {
    pool: PgPool,
}

impl PgSeriesStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and bring the schema up to date.
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Connected to Postgres, migrations applied");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SeriesStore for PgSeriesStore {
    async fn latest_timestamp(&self, key: &SeriesKey) -> Result<Option<DateTime<Utc>>, AppError> {
        Ok(series_queries::fetch_latest_ts(&self.pool, key).await?)
    }

    async fn existing_timestamps(
        &self,
        key: &SeriesKey,
        timestamps: &[DateTime<Utc>],
    ) -> Result<HashSet<DateTime<Utc>>, AppError> {
        let found = series_queries::fetch_existing_ts(&self.pool, key, timestamps).await?;
        Ok(found.into_iter().collect())
    }

    async fn insert_many(&self, points: &[SeriesPoint]) -> Result<u64, AppError> {
        if points.is_empty() {
            return Ok(0);
        }
        Ok(series_queries::insert_ignore(&self.pool, points).await?)
    }

    async fn scan_page(
        &self,
        key: &SeriesKey,
        after: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<SeriesPoint>, AppError> {
        Ok(series_queries::fetch_page(&self.pool, key, after, limit).await?)
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
        Ok(series_queries::fetch_range(&self.pool, key, from, to).await?)
    }

    async fn count(&self, key: &SeriesKey) -> Result<u64, AppError> {
        let n = series_queries::count(&self.pool, key).await?;
        Ok(n.max(0) as u64)
    }
}
