use chrono::Utc;
use tracing::{error, info, Instrument};

use crate::errors::AppError;
use crate::logging::job_span;
use crate::models::SourceKind;
use crate::services::cancel::CancelSignal;
use crate::services::extraction_service::ExtractionReport;
use crate::services::job_lock::extraction_job;
use crate::services::job_scheduler_service::JobResult;
use crate::services::watermark_service::WatermarkMode;
use crate::state::PipelineContext;

/// Extract one series from its watermark up to now.
///
/// Returns `Ok(None)` without doing anything when an extraction for the same
/// series is already running.
pub async fn run_extraction(
    ctx: &PipelineContext,
    kind: SourceKind,
    mode: WatermarkMode,
    cancel: &CancelSignal,
) -> Result<Option<ExtractionReport>, AppError> {
    let key = ctx.series_key(kind);
    let Some(_guard) = ctx.locks.try_acquire(extraction_job(&key)) else {
        info!("⏭️  Extraction for {} already running, skipping", key);
        return Ok(None);
    };

    let span = job_span("extraction", Some(&key));
    async {
        let now = Utc::now();
        let settings = ctx.config.extraction_for(kind);
        let start = ctx.watermarks().resolve(&key, mode, settings, now).await?;

        let report = ctx.extractor(kind).extract_range(&key, start, now, cancel).await?;
        Ok::<_, AppError>(Some(report))
    }
    .instrument(span)
    .await
}

/// Scheduler entry point: routine extraction of both series.
///
/// A failing series does not stop the other one; the first error is
/// returned once every series has had its run.
pub async fn extract_all_series(ctx: PipelineContext) -> Result<JobResult, AppError> {
    let cancel = CancelSignal::new();
    let mut result = JobResult::default();
    let mut first_error = None;

    for kind in [SourceKind::Price, SourceKind::Weather] {
        match run_extraction(&ctx, kind, WatermarkMode::Daily, &cancel).await {
            Ok(Some(report)) => {
                result.items_processed += report.points_inserted;
                result.items_failed += report.windows_skipped + report.windows_malformed;
            }
            Ok(None) => {}
            Err(e) => {
                error!("❌ Extraction for {} failed: {}", ctx.series_key(kind), e);
                result.items_failed += 1;
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(result),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::external::{FetchError, RawPayload, SeriesFetcher};
    use crate::models::SeriesKey;
    use crate::store::MemorySeriesStore;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use crate::models::SeriesPoint;
    use crate::store::SeriesStore;
    use chrono::DateTime;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Unreachable;

    #[async_trait]
    impl SeriesFetcher for Unreachable {
        async fn fetch(&self, _: &SeriesKey, _: NaiveDate, _: NaiveDate) -> Result<RawPayload, FetchError> {
            Err(FetchError::Network("offline".into()))
        }
    }

    fn context() -> PipelineContext {
        PipelineContext::new(
            test_config(),
            Arc::new(MemorySeriesStore::new()),
            Arc::new(Unreachable),
            Arc::new(Unreachable),
        )
    }

    #[tokio::test]
    async fn test_busy_series_is_skipped() {
        let ctx = context();
        let _held = ctx.locks.try_acquire(extraction_job(&ctx.config.price_key())).unwrap();
        let report = run_extraction(&ctx, SourceKind::Price, WatermarkMode::Daily, &CancelSignal::new())
            .await
            .unwrap();
        assert!(report.is_none());
    }

    #[tokio::test]
    async fn test_failed_windows_are_counted_not_raised() {
        let result = extract_all_series(context()).await.unwrap();
        assert_eq!(result.items_processed, 0);
        // one-day lookback fits in a single window per series
        assert_eq!(result.items_failed, 2);
    }

    /// Store whose price series is unreadable.
    struct BrokenPriceStore(MemorySeriesStore);

    impl BrokenPriceStore {
        fn check(key: &SeriesKey) -> Result<(), AppError> {
            match key.source_kind {
                SourceKind::Price => Err(AppError::Db(sqlx::Error::PoolClosed)),
                SourceKind::Weather => Ok(()),
            }
        }
    }

    #[async_trait]
    impl SeriesStore for BrokenPriceStore {
        async fn latest_timestamp(&self, key: &SeriesKey) -> Result<Option<DateTime<Utc>>, AppError> {
            Self::check(key)?;
            self.0.latest_timestamp(key).await
        }

        async fn existing_timestamps(
            &self,
            key: &SeriesKey,
            timestamps: &[DateTime<Utc>],
        ) -> Result<HashSet<DateTime<Utc>>, AppError> {
            Self::check(key)?;
            self.0.existing_timestamps(key, timestamps).await
        }

        async fn insert_many(&self, points: &[SeriesPoint]) -> Result<u64, AppError> {
            self.0.insert_many(points).await
        }

        async fn scan_page(
            &self,
            key: &SeriesKey,
            after: Option<DateTime<Utc>>,
            limit: usize,
        ) -> Result<Vec<SeriesPoint>, AppError> {
            self.0.scan_page(key, after, limit).await
        }

        async fn scan_range(
            &self,
            key: &SeriesKey,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<Vec<SeriesPoint>, AppError> {
            self.0.scan_range(key, from, to).await
        }

        async fn count(&self, key: &SeriesKey) -> Result<u64, AppError> {
            self.0.count(key).await
        }
    }

    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SeriesFetcher for CountingFetcher {
        async fn fetch(&self, _: &SeriesKey, _: NaiveDate, _: NaiveDate) -> Result<RawPayload, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Network("offline".into()))
        }
    }

    #[tokio::test]
    async fn test_weather_still_runs_when_price_store_fails() {
        let weather = Arc::new(CountingFetcher::default());
        let ctx = PipelineContext::new(
            test_config(),
            Arc::new(BrokenPriceStore(MemorySeriesStore::new())),
            Arc::new(Unreachable),
            weather.clone(),
        );

        let err = extract_all_series(ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Db(_)));
        // every attempt of the single weather window was made
        assert_eq!(weather.calls.load(Ordering::SeqCst), 3);
    }
}
