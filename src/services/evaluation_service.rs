use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::Serialize;
use tracing::info;

use crate::errors::AppError;
use crate::models::{ModelArtifact, SeriesKey, FEATURE_DIM};
use crate::services::batch_reader::BatchReader;
use crate::store::SeriesStore;

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRow {
    pub timestamp: DateTime<Utc>,
    pub actual: f64,
    pub predicted: f64,
    pub abs_error: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub rows: Vec<EvaluationRow>,
    pub mae: f64,
}

impl EvaluationReport {
    pub fn write_csv(&self, path: &Path) -> Result<(), AppError> {
        let mut writer = csv::Writer::from_path(path).map_err(std::io::Error::from)?;
        for row in &self.rows {
            writer.serialize(row).map_err(std::io::Error::from)?;
        }
        writer.flush()?;
        info!("Wrote {} prediction(s) to {}", self.rows.len(), path.display());
        Ok(())
    }
}

/// Scores a saved artifact against the oldest joined rows in the store.
pub struct EvaluationService {
    store: Arc<dyn SeriesStore>,
    price_key: SeriesKey,
    weather_key: SeriesKey,
}

impl EvaluationService {
    pub fn new(store: Arc<dyn SeriesStore>, price_key: SeriesKey, weather_key: SeriesKey) -> Self {
        Self {
            store,
            price_key,
            weather_key,
        }
    }

    pub async fn evaluate(&self, artifact: &ModelArtifact, sample_size: usize) -> Result<EvaluationReport, AppError> {
        if artifact.scaler.n_features() != FEATURE_DIM {
            return Err(AppError::ScalerDimensionMismatch {
                expected: artifact.scaler.n_features(),
                actual: FEATURE_DIM,
            });
        }
        let sample_size = sample_size.max(1);

        // Rows are rebuilt against the artifact's own epoch.
        let reader = BatchReader::new(
            self.store.clone(),
            self.price_key.clone(),
            self.weather_key.clone(),
            sample_size,
            artifact.epoch,
        );
        let mut pages = Box::pin(reader.into_stream());

        let mut rows = Vec::with_capacity(sample_size);
        while rows.len() < sample_size {
            let Some(batch) = pages.try_next().await? else {
                break;
            };
            for record in batch.into_iter().take(sample_size - rows.len()) {
                let predicted = artifact.predict(&record.feature_row())?;
                rows.push(EvaluationRow {
                    timestamp: record.timestamp,
                    actual: record.label,
                    predicted,
                    abs_error: (predicted - record.label).abs(),
                });
            }
        }

        if rows.is_empty() {
            return Err(AppError::EmptyDataset);
        }
        let mae = rows.iter().map(|r| r.abs_error).sum::<f64>() / rows.len() as f64;
        info!("📊 MAE over {} row(s): {:.4}", rows.len(), mae);
        Ok(EvaluationReport { rows, mae })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{SgdConfig, SgdRegressor, StandardScaler};
    use crate::models::{SeriesPoint, TrainingMode, PRICE_FIELD, WEATHER_FIELDS};
    use crate::store::MemorySeriesStore;
    use chrono::{Duration, TimeZone};
    use ndarray::Array2;

    fn ts(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
    }

    fn zero_model(width: usize) -> ModelArtifact {
        let x = Array2::from_shape_fn((3, width), |(i, _)| i as f64);
        ModelArtifact::new(
            StandardScaler::fit(x.view()).unwrap(),
            SgdRegressor::new(width, SgdConfig::default()),
            Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap(),
            TrainingMode::Full,
            3,
            1,
        )
    }

    async fn seeded_store(hours: i64) -> Arc<MemorySeriesStore> {
        let store = Arc::new(MemorySeriesStore::new());
        let mut points = Vec::new();
        for h in 0..hours {
            points.push(SeriesPoint::new(ts(h), SeriesKey::price("DE-LU")).with_field(PRICE_FIELD, 10.0));
            points.push(WEATHER_FIELDS.iter().fold(
                SeriesPoint::new(ts(h), SeriesKey::weather("here")),
                |p, name| p.with_field(name, 1.0),
            ));
        }
        store.insert_many(&points).await.unwrap();
        store
    }

    fn service(store: Arc<MemorySeriesStore>) -> EvaluationService {
        EvaluationService::new(store, SeriesKey::price("DE-LU"), SeriesKey::weather("here"))
    }

    #[tokio::test]
    async fn test_mae_of_zero_model() {
        let svc = service(seeded_store(6).await);
        let report = svc.evaluate(&zero_model(FEATURE_DIM), 4).await.unwrap();
        assert_eq!(report.rows.len(), 4);
        // untrained model predicts 0 against labels of 10
        assert!((report.mae - 10.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_empty_store_is_empty_dataset() {
        let svc = service(Arc::new(MemorySeriesStore::new()));
        let err = svc.evaluate(&zero_model(FEATURE_DIM), 10).await.unwrap_err();
        assert!(matches!(err, AppError::EmptyDataset));
    }

    #[tokio::test]
    async fn test_drifted_artifact_is_rejected() {
        let svc = service(seeded_store(2).await);
        let err = svc.evaluate(&zero_model(11), 10).await.unwrap_err();
        assert!(matches!(err, AppError::ScalerDimensionMismatch { expected: 11, actual: 12 }));
    }

    #[tokio::test]
    async fn test_csv_export() {
        let svc = service(seeded_store(3).await);
        let report = svc.evaluate(&zero_model(FEATURE_DIM), 3).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.csv");
        report.write_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("timestamp,actual,predicted,abs_error"));
        assert_eq!(lines.count(), 3);
    }
}
