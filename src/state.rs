use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::external::SeriesFetcher;
use crate::models::{ModelArtifact, SeriesKey, SourceKind};
use crate::services::artifact_store::ArtifactStore;
use crate::services::evaluation_service::EvaluationService;
use crate::services::extraction_service::ExtractionService;
use crate::services::job_lock::JobLocks;
use crate::services::series_writer::SeriesWriter;
use crate::services::training_service::TrainingService;
use crate::services::watermark_service::WatermarkService;
use crate::store::SeriesStore;

/// Everything a pipeline run needs, built once at startup and passed down.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<PipelineConfig>,
    pub store: Arc<dyn SeriesStore>,
    pub price_fetcher: Arc<dyn SeriesFetcher>,
    pub weather_fetcher: Arc<dyn SeriesFetcher>,
    pub artifacts: ArtifactStore,
    pub locks: JobLocks,
}

impl PipelineContext {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn SeriesStore>,
        price_fetcher: Arc<dyn SeriesFetcher>,
        weather_fetcher: Arc<dyn SeriesFetcher>,
    ) -> Self {
        let artifacts = ArtifactStore::new(config.model_path.clone());
        Self {
            config: Arc::new(config),
            store,
            price_fetcher,
            weather_fetcher,
            artifacts,
            locks: JobLocks::new(),
        }
    }

    pub fn series_key(&self, kind: SourceKind) -> SeriesKey {
        match kind {
            SourceKind::Price => self.config.price_key(),
            SourceKind::Weather => self.config.weather_key(),
        }
    }

    pub fn extractor(&self, kind: SourceKind) -> ExtractionService {
        let fetcher = match kind {
            SourceKind::Price => self.price_fetcher.clone(),
            SourceKind::Weather => self.weather_fetcher.clone(),
        };
        ExtractionService::new(
            fetcher,
            SeriesWriter::new(self.store.clone()),
            self.config.extraction_for(kind).clone(),
        )
    }

    pub fn watermarks(&self) -> WatermarkService {
        WatermarkService::new(self.store.clone())
    }

    pub fn trainer(&self) -> TrainingService {
        TrainingService::new(self.store.clone(), self.artifacts.clone(), &self.config)
    }

    pub fn evaluator(&self) -> EvaluationService {
        EvaluationService::new(self.store.clone(), self.config.price_key(), self.config.weather_key())
    }
}

/// Serving state: the artifact loaded at startup.
#[derive(Clone)]
pub struct AppState {
    pub artifact: Arc<ModelArtifact>,
}
