//! Windowed extraction: walk a time range in source-sized windows, fetch each
//! with bounded retries, and hand decoded points to the writer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::ExtractionConfig;
use crate::errors::AppError;
use crate::external::payload;
use crate::external::{RawPayload, SeriesFetcher};
use crate::models::SeriesKey;
use crate::services::cancel::CancelSignal;
use crate::services::retry::{retry_bounded, RetryPolicy};
use crate::services::series_writer::{SeriesWriter, WriteSummary};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionReport {
    pub windows_attempted: usize,
    pub windows_succeeded: usize,
    pub windows_skipped: usize,
    pub windows_malformed: usize,
    pub points_received: usize,
    pub points_inserted: usize,
    pub cancelled: bool,
}

pub struct ExtractionService {
    fetcher: Arc<dyn SeriesFetcher>,
    writer: SeriesWriter,
    settings: ExtractionConfig,
    clock: Clock,
}

impl ExtractionService {
    pub fn new(fetcher: Arc<dyn SeriesFetcher>, writer: SeriesWriter, settings: ExtractionConfig) -> Self {
        Self {
            fetcher,
            writer,
            settings,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Extract `[start, end]` for `key`. `end` is clamped to the current time.
    ///
    /// A window whose fetch keeps failing is skipped, and a window whose payload
    /// is malformed is dropped; neither stops later windows. Store failures
    /// abort the run. `cancel` is checked between windows only.
    pub async fn extract_range(
        &self,
        key: &SeriesKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cancel: &CancelSignal,
    ) -> Result<ExtractionReport, AppError> {
        let end = end.min((self.clock)());
        let mut report = ExtractionReport::default();

        info!("📥 Extracting {} from {} to {}", key, start, end);

        let mut cursor = start;
        while cursor < end {
            if cancel.is_cancelled() {
                warn!("{}: extraction cancelled before window starting {}", key, cursor);
                report.cancelled = true;
                break;
            }

            let window_end = (cursor + self.settings.window).min(end).min((self.clock)());
            if window_end <= cursor {
                break;
            }
            report.windows_attempted += 1;
            self.run_window(key, cursor, window_end, &mut report).await?;
            cursor = window_end;

            if cursor < end && !self.settings.pacing.is_zero() {
                tokio::time::sleep(self.settings.pacing).await;
            }
        }

        info!(
            "✅ {}: {} window(s), {} ok, {} skipped, {} malformed, {} new point(s)",
            key,
            report.windows_attempted,
            report.windows_succeeded,
            report.windows_skipped,
            report.windows_malformed,
            report.points_inserted
        );
        Ok(report)
    }

    async fn run_window(
        &self,
        key: &SeriesKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        report: &mut ExtractionReport,
    ) -> Result<(), AppError> {
        let (from_date, to_date) = (from.date_naive(), to.date_naive());
        let label = format!("{} {}..{}", key, from_date, to_date);
        let policy = RetryPolicy {
            max_attempts: self.settings.max_attempts,
            delay: self.settings.retry_delay,
        };

        let fetched = retry_bounded(policy, &label, |_| self.fetcher.fetch(key, from_date, to_date)).await;
        let raw = match fetched {
            Ok(raw) => raw,
            Err(exhausted) => {
                let err = AppError::FetchFailure {
                    series: key.to_string(),
                    attempts: exhausted.attempts,
                    message: exhausted.last_error.to_string(),
                };
                error!("{}: {}; skipping window", label, err);
                report.windows_skipped += 1;
                return Ok(());
            }
        };

        match self.ingest(raw).await {
            Ok(summary) => {
                report.windows_succeeded += 1;
                report.points_received += summary.received;
                report.points_inserted += summary.inserted;
                Ok(())
            }
            Err(AppError::MalformedBatch(reason)) => {
                warn!("{}: dropping malformed batch: {}", label, reason);
                report.windows_malformed += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn ingest(&self, raw: RawPayload) -> Result<WriteSummary, AppError> {
        let points = payload::decode(raw)?;
        self.writer.write(&points).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::external::FetchError;
    use crate::store::{MemorySeriesStore, SeriesStore};
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate, TimeZone};
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Ok,
        Fail,
        Malformed,
    }

    struct ScriptedFetcher {
        behaviour: Behaviour,
        calls: Mutex<Vec<(NaiveDate, NaiveDate)>>,
        cancel_on_call: Option<CancelSignal>,
    }

    impl ScriptedFetcher {
        fn new(behaviour: Behaviour) -> Self {
            Self {
                behaviour,
                calls: Mutex::new(Vec::new()),
                cancel_on_call: None,
            }
        }
    }

    #[async_trait]
    impl SeriesFetcher for ScriptedFetcher {
        async fn fetch(&self, key: &SeriesKey, start: NaiveDate, end: NaiveDate) -> Result<RawPayload, FetchError> {
            self.calls.lock().push((start, end));
            if let Some(signal) = &self.cancel_on_call {
                signal.cancel();
            }
            let secs = start.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
            let body = match self.behaviour {
                Behaviour::Fail => return Err(FetchError::Network("connection refused".into())),
                Behaviour::Ok => json!({ "unix_seconds": [secs, secs + 3600], "price": [10.0, 11.0], "unit": "EUR / MWh" }),
                Behaviour::Malformed => json!({ "unix_seconds": [secs, secs + 3600], "price": [10.0] }),
            };
            Ok(RawPayload { series_key: key.clone(), body })
        }
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn service(fetcher: Arc<ScriptedFetcher>, store: Arc<MemorySeriesStore>, now: DateTime<Utc>) -> ExtractionService {
        let settings = test_config().price_extraction;
        ExtractionService::new(fetcher, SeriesWriter::new(store), settings).with_clock(Arc::new(move || now))
    }

    #[tokio::test]
    async fn test_splits_range_into_windows() {
        let fetcher = Arc::new(ScriptedFetcher::new(Behaviour::Ok));
        let store = Arc::new(MemorySeriesStore::new());
        let svc = service(fetcher.clone(), store.clone(), at(31));

        let report = svc
            .extract_range(&SeriesKey::price("DE-LU"), at(1), at(20), &CancelSignal::new())
            .await
            .unwrap();

        let calls = fetcher.calls.lock().clone();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], (at(1).date_naive(), at(8).date_naive()));
        assert_eq!(calls[2], (at(15).date_naive(), at(20).date_naive()));
        assert_eq!(report.windows_succeeded, 3);
        assert_eq!(report.points_inserted, 6);
        assert_eq!(store.count(&SeriesKey::price("DE-LU")).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_always_failing_fetch_hits_ceiling_per_window() {
        let fetcher = Arc::new(ScriptedFetcher::new(Behaviour::Fail));
        let store = Arc::new(MemorySeriesStore::new());
        let svc = service(fetcher.clone(), store, at(31));

        let report = svc
            .extract_range(&SeriesKey::price("DE-LU"), at(1), at(15), &CancelSignal::new())
            .await
            .unwrap();

        assert_eq!(report.windows_attempted, 2);
        assert_eq!(report.windows_skipped, 2);
        // 3 attempts for each of the two windows
        assert_eq!(fetcher.calls.lock().len(), 6);
    }

    #[tokio::test]
    async fn test_end_is_clamped_to_now() {
        let fetcher = Arc::new(ScriptedFetcher::new(Behaviour::Ok));
        let store = Arc::new(MemorySeriesStore::new());
        let now = at(3) + Duration::hours(12);
        let svc = service(fetcher.clone(), store, now);

        let report = svc
            .extract_range(&SeriesKey::price("DE-LU"), at(1), at(30), &CancelSignal::new())
            .await
            .unwrap();

        assert_eq!(report.windows_attempted, 1);
        assert_eq!(fetcher.calls.lock()[0], (at(1).date_naive(), at(3).date_naive()));
    }

    #[tokio::test]
    async fn test_start_after_end_does_nothing() {
        let fetcher = Arc::new(ScriptedFetcher::new(Behaviour::Ok));
        let svc = service(fetcher.clone(), Arc::new(MemorySeriesStore::new()), at(31));
        let report = svc
            .extract_range(&SeriesKey::price("DE-LU"), at(10), at(5), &CancelSignal::new())
            .await
            .unwrap();
        assert_eq!(report, ExtractionReport::default());
        assert!(fetcher.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_window_is_dropped_and_run_continues() {
        let fetcher = Arc::new(ScriptedFetcher::new(Behaviour::Malformed));
        let store = Arc::new(MemorySeriesStore::new());
        let svc = service(fetcher.clone(), store.clone(), at(31));

        let report = svc
            .extract_range(&SeriesKey::price("DE-LU"), at(1), at(15), &CancelSignal::new())
            .await
            .unwrap();

        assert_eq!(report.windows_malformed, 2);
        assert_eq!(fetcher.calls.lock().len(), 2);
        assert_eq!(store.count(&SeriesKey::price("DE-LU")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancel_is_checked_between_windows() {
        let signal = CancelSignal::new();
        let fetcher = Arc::new(ScriptedFetcher {
            cancel_on_call: Some(signal.clone()),
            ..ScriptedFetcher::new(Behaviour::Ok)
        });
        let store = Arc::new(MemorySeriesStore::new());
        let svc = service(fetcher.clone(), store.clone(), at(31));

        let report = svc
            .extract_range(&SeriesKey::price("DE-LU"), at(1), at(29), &signal)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.windows_attempted, 1);
        // the in-flight window still completes
        assert_eq!(store.count(&SeriesKey::price("DE-LU")).await.unwrap(), 2);
    }
}
