use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::errors::AppError;
use crate::jobs::{extraction_job, training_job};
use crate::state::PipelineContext;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JobResult {
    pub items_processed: usize,
    pub items_failed: usize,
}

pub struct JobSchedulerService {
    scheduler: JobScheduler,
    context: PipelineContext,
}

impl JobSchedulerService {
    pub async fn new(context: PipelineContext) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self { scheduler, context })
    }

    /// Register the interval jobs and start ticking.
    pub async fn start(&mut self) -> Result<(), AppError> {
        info!("🚀 Starting job scheduler...");

        let extraction_every = Duration::from_secs(self.context.config.extraction_interval_secs);
        let training_every = Duration::from_secs(self.context.config.training_interval_secs);

        self.schedule_job(extraction_every, "extract_series", extraction_job::extract_all_series)
            .await?;
        self.schedule_job(training_every, "train_model", training_job::train_model_job)
            .await?;

        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to start scheduler: {}", e)))?;

        info!("✅ Job scheduler started with 2 jobs");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), AppError> {
        info!("🛑 Stopping job scheduler...");
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to stop scheduler: {}", e)))?;
        info!("✅ Job scheduler stopped");
        Ok(())
    }

    async fn schedule_job<F, Fut>(&mut self, every: Duration, job_name: &'static str, job_fn: F) -> Result<(), AppError>
    where
        F: Fn(PipelineContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<JobResult, AppError>> + Send + 'static,
    {
        let context = self.context.clone();
        let job_fn = Arc::new(job_fn);

        let job = Job::new_repeated_async(every, move |_uuid, _l| {
            let context = context.clone();
            let job_fn = job_fn.clone();
            Box::pin(async move {
                execute_job_with_tracking(job_name, context, job_fn).await;
            })
        })
        .map_err(|e| AppError::Scheduler(format!("Failed to create job {}: {}", job_name, e)))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to add job {}: {}", job_name, e)))?;

        info!("📅 Scheduled: {} every {:?}", job_name, every);
        Ok(())
    }
}

/// Runs one job invocation on its own task. Errors and panics end here so a
/// failed run never stops later ticks.
pub async fn execute_job_with_tracking<F, Fut>(job_name: &str, context: PipelineContext, job_fn: Arc<F>) -> Option<JobResult>
where
    F: Fn(PipelineContext) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<JobResult, AppError>> + Send + 'static,
{
    info!("🏃 Starting job: {}", job_name);
    let started_at = Utc::now();

    let outcome = tokio::spawn(async move { job_fn(context).await }).await;
    let duration_ms = (Utc::now() - started_at).num_milliseconds();

    match outcome {
        Ok(Ok(job_result)) => {
            info!(
                "✅ Job completed: {} (processed: {}, failed: {}, duration: {}ms)",
                job_name, job_result.items_processed, job_result.items_failed, duration_ms
            );
            Some(job_result)
        }
        Ok(Err(e)) => {
            error!("❌ Job failed: {} - {} ({}ms)", job_name, e, duration_ms);
            None
        }
        Err(join_error) => {
            error!("❌ Job aborted: {} - {} ({}ms)", job_name, join_error, duration_ms);
            None
        }
    }
}
