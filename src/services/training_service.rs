//! Training runs over the joined batch stream.
//!
//! Two strategies share one interface. `FullBatchStrategy` accumulates every
//! batch and fits once with recency weights; its memory grows with the
//! dataset. `StreamingStrategy` fits the scaler on the first non-empty batch
//! and then updates the model batch by batch, keeping memory bounded by one
//! batch.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::errors::AppError;
use crate::ml::{SgdConfig, SgdRegressor, StandardScaler};
use crate::models::{JoinedRecord, ModelArtifact, SeriesKey, TrainingMode, FEATURE_DIM};
use crate::services::artifact_store::ArtifactStore;
use crate::services::batch_reader::BatchReader;
use crate::store::SeriesStore;

pub trait TrainingStrategy: Send {
    fn mode(&self) -> TrainingMode;

    /// Feed one joined batch. Empty batches leave state untouched.
    fn consume(&mut self, batch: &[JoinedRecord]) -> Result<(), AppError>;

    /// Produce the artifact, or `None` when no rows were ever consumed.
    fn finish(self: Box<Self>) -> Result<Option<ModelArtifact>, AppError>;
}

fn to_matrix(batch: &[JoinedRecord]) -> Result<(Array2<f64>, Array1<f64>), AppError> {
    let flat: Vec<f64> = batch.iter().flat_map(|r| r.feature_row()).collect();
    let x = Array2::from_shape_vec((batch.len(), FEATURE_DIM), flat)
        .map_err(|e| AppError::Internal(format!("feature matrix shape: {}", e)))?;
    let y = batch.iter().map(|r| r.label).collect();
    Ok((x, y))
}

pub struct FullBatchStrategy {
    sgd: SgdConfig,
    epoch: DateTime<Utc>,
    features: Vec<f64>,
    labels: Vec<f64>,
    weights: Vec<f64>,
    batches: usize,
}

impl FullBatchStrategy {
    pub fn new(sgd: SgdConfig, epoch: DateTime<Utc>) -> Self {
        Self {
            sgd,
            epoch,
            features: Vec::new(),
            labels: Vec::new(),
            weights: Vec::new(),
            batches: 0,
        }
    }

    pub fn samples(&self) -> usize {
        self.labels.len()
    }
}

impl TrainingStrategy for FullBatchStrategy {
    fn mode(&self) -> TrainingMode {
        TrainingMode::Full
    }

    fn consume(&mut self, batch: &[JoinedRecord]) -> Result<(), AppError> {
        if batch.is_empty() {
            return Ok(());
        }
        for record in batch {
            self.features.extend_from_slice(&record.feature_row());
            self.labels.push(record.label);
            self.weights.push(record.recency_weight());
        }
        self.batches += 1;
        debug!("Accumulated {} sample(s) over {} batch(es)", self.labels.len(), self.batches);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Option<ModelArtifact>, AppError> {
        let n = self.labels.len();
        if n == 0 {
            return Ok(None);
        }

        let x = Array2::from_shape_vec((n, FEATURE_DIM), self.features)
            .map_err(|e| AppError::Internal(format!("feature matrix shape: {}", e)))?;
        let scaler = StandardScaler::fit(x.view())?;
        let scaled = scaler.transform(x.view())?;

        let mut model = SgdRegressor::new(FEATURE_DIM, self.sgd);
        let y = Array1::from(self.labels);
        let w = Array1::from(self.weights);
        model.fit_weighted(scaled.view(), y.view(), w.view())?;

        Ok(Some(ModelArtifact::new(scaler, model, self.epoch, TrainingMode::Full, n, self.batches)))
    }
}

pub struct StreamingStrategy {
    sgd: SgdConfig,
    epoch: DateTime<Utc>,
    scaler: Option<StandardScaler>,
    model: Option<SgdRegressor>,
    samples: usize,
    batches: usize,
}

impl StreamingStrategy {
    pub fn new(sgd: SgdConfig, epoch: DateTime<Utc>) -> Self {
        Self {
            sgd,
            epoch,
            scaler: None,
            model: None,
            samples: 0,
            batches: 0,
        }
    }

    /// Scaler fitted on the first non-empty batch, if any yet.
    pub fn scaler(&self) -> Option<&StandardScaler> {
        self.scaler.as_ref()
    }

    /// Update from a raw feature matrix. The scaler is fitted on the first
    /// call with rows and only applied afterwards.
    pub fn consume_matrix(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), AppError> {
        if x.nrows() == 0 {
            return Ok(());
        }

        let scaler = match &mut self.scaler {
            Some(scaler) => scaler,
            empty => {
                let fitted = StandardScaler::fit(x)?;
                info!("Scaler fitted on first batch ({} rows, {} features)", x.nrows(), x.ncols());
                empty.insert(fitted)
            }
        };
        let scaled = scaler.transform(x)?;

        let (width, sgd) = (scaler.n_features(), self.sgd);
        let model = self.model.get_or_insert_with(|| SgdRegressor::new(width, sgd));
        model.partial_fit(scaled.view(), y)?;

        self.samples += x.nrows();
        self.batches += 1;
        Ok(())
    }
}

impl TrainingStrategy for StreamingStrategy {
    fn mode(&self) -> TrainingMode {
        TrainingMode::Streaming
    }

    fn consume(&mut self, batch: &[JoinedRecord]) -> Result<(), AppError> {
        if batch.is_empty() {
            return Ok(());
        }
        let (x, y) = to_matrix(batch)?;
        self.consume_matrix(x.view(), y.view())
    }

    fn finish(self: Box<Self>) -> Result<Option<ModelArtifact>, AppError> {
        let this = *self;
        match (this.scaler, this.model) {
            (Some(scaler), Some(model)) => Ok(Some(ModelArtifact::new(
                scaler,
                model,
                this.epoch,
                TrainingMode::Streaming,
                this.samples,
                this.batches,
            ))),
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TrainingOutcome {
    Trained {
        mode: TrainingMode,
        samples: usize,
        batches: usize,
        path: PathBuf,
    },
    /// No joined rows; nothing was written.
    EmptyDataset,
}

#[derive(Clone)]
pub struct TrainingService {
    store: Arc<dyn SeriesStore>,
    artifacts: ArtifactStore,
    price_key: SeriesKey,
    weather_key: SeriesKey,
    page_size: usize,
    epoch: DateTime<Utc>,
    sgd: SgdConfig,
}

impl TrainingService {
    pub fn new(store: Arc<dyn SeriesStore>, artifacts: ArtifactStore, config: &PipelineConfig) -> Self {
        Self {
            store,
            artifacts,
            price_key: config.price_key(),
            weather_key: config.weather_key(),
            page_size: config.batch_size,
            epoch: config.feature_epoch,
            sgd: SgdConfig {
                epochs: config.model_epochs,
                seed: config.model_seed,
                ..SgdConfig::default()
            },
        }
    }

    pub fn strategy_for(&self, mode: TrainingMode) -> Box<dyn TrainingStrategy> {
        match mode {
            TrainingMode::Full => Box::new(FullBatchStrategy::new(self.sgd, self.epoch)),
            TrainingMode::Streaming => Box::new(StreamingStrategy::new(self.sgd, self.epoch)),
        }
    }

    /// Read every joined batch, train, and save atomically.
    ///
    /// An empty dataset is reported as `TrainingOutcome::EmptyDataset` and
    /// leaves any existing artifact untouched. Any error aborts without saving.
    pub async fn run(&self, mode: TrainingMode) -> Result<TrainingOutcome, AppError> {
        info!("🧠 Starting {} training run", mode);
        let started = std::time::Instant::now();

        let mut reader = BatchReader::new(
            self.store.clone(),
            self.price_key.clone(),
            self.weather_key.clone(),
            self.page_size,
            self.epoch,
        );
        let mut strategy = self.strategy_for(mode);

        let (mut pages, mut rows) = (0usize, 0usize);
        while let Some(batch) = reader.next_batch().await? {
            pages += 1;
            rows += batch.len();
            if batch.is_empty() {
                debug!("Page {} joined no rows, skipping", pages);
                continue;
            }
            strategy.consume(&batch)?;
        }
        info!("Read {} page(s), {} joined row(s)", pages, rows);

        let artifacts = self.artifacts.clone();
        let outcome = tokio::task::spawn_blocking(move || -> Result<TrainingOutcome, AppError> {
            let mode = strategy.mode();
            match strategy.finish()? {
                Some(artifact) => {
                    artifacts.save(&artifact)?;
                    Ok(TrainingOutcome::Trained {
                        mode,
                        samples: artifact.samples,
                        batches: artifact.batches,
                        path: artifacts.path().to_path_buf(),
                    })
                }
                None => Ok(TrainingOutcome::EmptyDataset),
            }
        })
        .await
        .map_err(|e| AppError::Internal(format!("training task failed: {}", e)))??;

        match &outcome {
            TrainingOutcome::Trained { samples, .. } => info!(
                "✅ Training finished: {} sample(s) in {:.2}s",
                samples,
                started.elapsed().as_secs_f64()
            ),
            TrainingOutcome::EmptyDataset => {
                warn!("No joined rows available; model artifact left unchanged")
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use ndarray::array;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap()
    }

    fn record(hour: i64, temperature: f64, label: f64) -> JoinedRecord {
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour);
        let mut features = [1.0; 11];
        features[0] = temperature;
        JoinedRecord {
            timestamp,
            label,
            features,
            days_since_epoch: crate::models::days_since_epoch(timestamp, epoch()),
        }
    }

    #[test]
    fn test_full_batch_skips_empty_batches_and_counts_samples() {
        let mut strategy = Box::new(FullBatchStrategy::new(SgdConfig::default(), epoch()));
        strategy.consume(&[]).unwrap();
        strategy.consume(&[record(0, 1.0, 50.0), record(1, 2.0, 55.0)]).unwrap();
        strategy.consume(&[record(30, 3.0, 60.0)]).unwrap();
        assert_eq!(strategy.samples(), 3);

        let artifact = strategy.finish().unwrap().unwrap();
        assert_eq!(artifact.samples, 3);
        assert_eq!(artifact.batches, 2);
        assert_eq!(artifact.mode, TrainingMode::Full);
        assert_eq!(artifact.scaler.n_samples_seen(), 3);
        assert!(artifact.validate().is_ok());
    }

    #[test]
    fn test_full_batch_is_deterministic() {
        let batch: Vec<_> = (0..48).map(|h| record(h, h as f64 * 0.1, 40.0 + h as f64)).collect();
        let fit = || {
            let mut s = Box::new(FullBatchStrategy::new(SgdConfig::default(), epoch()));
            s.consume(&batch).unwrap();
            s.finish().unwrap().unwrap()
        };
        assert_eq!(fit().model, fit().model);
    }

    #[test]
    fn test_nothing_consumed_yields_none() {
        let full: Box<dyn TrainingStrategy> = Box::new(FullBatchStrategy::new(SgdConfig::default(), epoch()));
        assert!(full.finish().unwrap().is_none());
        let mut streaming: Box<dyn TrainingStrategy> =
            Box::new(StreamingStrategy::new(SgdConfig::default(), epoch()));
        streaming.consume(&[]).unwrap();
        assert!(streaming.finish().unwrap().is_none());
    }

    #[test]
    fn test_streaming_scaler_is_fitted_once() {
        let mut strategy = StreamingStrategy::new(SgdConfig::default(), epoch());
        strategy
            .consume_matrix(array![[1.0, 10.0], [3.0, 20.0]].view(), array![1.0, 2.0].view())
            .unwrap();
        let first = strategy.scaler().unwrap().clone();

        // shifted distribution
        strategy
            .consume_matrix(array![[100.0, 500.0], [300.0, 900.0]].view(), array![5.0, 6.0].view())
            .unwrap();
        assert_eq!(strategy.scaler().unwrap(), &first);
        assert_eq!(strategy.model.as_ref().unwrap().updates(), 4);
    }

    #[test]
    fn test_streaming_rejects_drifted_width() {
        let mut strategy = StreamingStrategy::new(SgdConfig::default(), epoch());
        strategy
            .consume_matrix(array![[1.0, 2.0]].view(), array![1.0].view())
            .unwrap();
        let err = strategy
            .consume_matrix(array![[1.0, 2.0, 3.0]].view(), array![1.0].view())
            .unwrap_err();
        assert!(matches!(err, AppError::ScalerDimensionMismatch { expected: 2, actual: 3 }));
    }

    #[test]
    fn test_streaming_artifact_has_feature_width() {
        let mut strategy: Box<dyn TrainingStrategy> =
            Box::new(StreamingStrategy::new(SgdConfig::default(), epoch()));
        strategy.consume(&[record(0, 1.0, 50.0), record(1, 2.0, 52.0)]).unwrap();
        strategy.consume(&[record(2, 3.0, 54.0)]).unwrap();
        let artifact = strategy.finish().unwrap().unwrap();
        assert_eq!(artifact.mode, TrainingMode::Streaming);
        assert_eq!(artifact.samples, 3);
        assert_eq!(artifact.batches, 2);
        assert_eq!(artifact.model.n_features(), FEATURE_DIM);
    }
}
