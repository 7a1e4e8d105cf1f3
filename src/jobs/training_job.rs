use tracing::{info, Instrument};

use crate::errors::AppError;
use crate::logging::job_span;
use crate::models::TrainingMode;
use crate::services::job_lock::TRAINING_JOB;
use crate::services::job_scheduler_service::JobResult;
use crate::services::training_service::TrainingOutcome;
use crate::state::PipelineContext;

/// Train once. `Ok(None)` when another training run holds the lock.
pub async fn run_training(ctx: &PipelineContext, mode: TrainingMode) -> Result<Option<TrainingOutcome>, AppError> {
    let Some(_guard) = ctx.locks.try_acquire(TRAINING_JOB) else {
        info!("⏭️  Training already running, skipping");
        return Ok(None);
    };
    ctx.trainer()
        .run(mode)
        .instrument(job_span("training", None))
        .await
        .map(Some)
}

/// Scheduler entry point using the configured training mode.
pub async fn train_model_job(ctx: PipelineContext) -> Result<JobResult, AppError> {
    let mode = ctx.config.training_mode;
    let processed = match run_training(&ctx, mode).await? {
        Some(TrainingOutcome::Trained { samples, .. }) => samples,
        Some(TrainingOutcome::EmptyDataset) | None => 0,
    };
    Ok(JobResult {
        items_processed: processed,
        items_failed: 0,
    })
}
