use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::error;

use crate::models::{SeriesKey, SeriesPoint};

#[derive(Debug, FromRow)]
pub struct SeriesRow {
    pub ts: DateTime<Utc>,
    pub value_fields: Json<BTreeMap<String, f64>>,
}

impl SeriesRow {
    fn into_point(self, key: &SeriesKey) -> SeriesPoint {
        SeriesPoint {
            timestamp: self.ts,
            series_key: key.clone(),
            value_fields: self.value_fields.0,
        }
    }
}

pub async fn fetch_latest_ts(
    pool: &PgPool,
    key: &SeriesKey,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
        "SELECT MAX(ts) FROM series_points WHERE source_kind = $1 AND zone_id = $2",
    )
    .bind(key.source_kind.as_str())
    .bind(&key.zone_id)
    .fetch_one(pool)
    .await
}

pub async fn fetch_existing_ts(
    pool: &PgPool,
    key: &SeriesKey,
    timestamps: &[DateTime<Utc>],
) -> Result<Vec<DateTime<Utc>>, sqlx::Error> {
    if timestamps.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_scalar::<_, DateTime<Utc>>(
        r#"
        SELECT ts FROM series_points
        WHERE source_kind = $1 AND zone_id = $2 AND ts = ANY($3)
        "#,
    )
    .bind(key.source_kind.as_str())
    .bind(&key.zone_id)
    .bind(timestamps)
    .fetch_all(pool)
    .await
}

/// Inserts in one transaction; rows whose identity already exists are skipped.
pub async fn insert_ignore(pool: &PgPool, points: &[SeriesPoint]) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for p in points {
        let result = sqlx::query(
            r#"
            INSERT INTO series_points (ts, source_kind, zone_id, value_fields)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (source_kind, zone_id, ts) DO NOTHING
            "#,
        )
        .bind(p.timestamp)
        .bind(p.series_key.source_kind.as_str())
        .bind(&p.series_key.zone_id)
        .bind(Json(&p.value_fields))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to insert {} point at {}: {}", p.series_key, p.timestamp, e);
            e
        })?;
        inserted += result.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

pub async fn fetch_page(
    pool: &PgPool,
    key: &SeriesKey,
    after: Option<DateTime<Utc>>,
    limit: usize,
) -> Result<Vec<SeriesPoint>, sqlx::Error> {
    let rows = sqlx::query_as::<_, SeriesRow>(
        r#"
        SELECT ts, value_fields FROM series_points
        WHERE source_kind = $1 AND zone_id = $2
          AND ($3::timestamptz IS NULL OR ts > $3)
        ORDER BY ts ASC
        LIMIT $4
        "#,
    )
    .bind(key.source_kind.as_str())
    .bind(&key.zone_id)
    .bind(after)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into_point(key)).collect())
}

pub async fn fetch_range(
    pool: &PgPool,
    key: &SeriesKey,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<SeriesPoint>, sqlx::Error> {
    let rows = sqlx::query_as::<_, SeriesRow>(
        r#"
        SELECT ts, value_fields FROM series_points
        WHERE source_kind = $1 AND zone_id = $2 AND ts BETWEEN $3 AND $4
        ORDER BY ts ASC
        "#,
    )
    .bind(key.source_kind.as_str())
    .bind(&key.zone_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into_point(key)).collect())
}

pub async fn count(pool: &PgPool, key: &SeriesKey) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM series_points WHERE source_kind = $1 AND zone_id = $2",
    )
    .bind(key.source_kind.as_str())
    .bind(&key.zone_id)
    .fetch_one(pool)
    .await
}
