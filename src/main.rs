use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use energy_pipeline::app;
use energy_pipeline::cli::{BackfillArgs, Cli, Command, EvaluateArgs, SeriesArgs, TrainArgs};
use energy_pipeline::config::PipelineConfig;
use energy_pipeline::errors::AppError;
use energy_pipeline::external::{EnergyChartsClient, OpenMeteoClient};
use energy_pipeline::jobs::{extraction_job, training_job};
use energy_pipeline::logging::{init_logging, LoggingConfig};
use energy_pipeline::models::{SourceKind, TrainingMode};
use energy_pipeline::services::artifact_store::ArtifactStore;
use energy_pipeline::services::cancel::CancelSignal;
use energy_pipeline::services::job_scheduler_service::JobSchedulerService;
use energy_pipeline::services::stats_service;
use energy_pipeline::services::training_service::TrainingOutcome;
use energy_pipeline::services::watermark_service::WatermarkMode;
use energy_pipeline::state::{AppState, PipelineContext};
use energy_pipeline::store::{MemorySeriesStore, PgSeriesStore, SeriesStore};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(e.exit_code());
        }
    };

    if let Err(e) = init_logging(LoggingConfig::from_env()) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::from(2);
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            let code = err.downcast_ref::<AppError>().map(AppError::exit_code).unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli, config: PipelineConfig) -> anyhow::Result<()> {
    if let Command::Serve = cli.command {
        return serve(&config).await;
    }

    let ctx = build_context(config, cli.memory).await?;
    match cli.command {
        Command::Extract(SeriesArgs { series }) => {
            extract(&ctx, &series.kinds(), WatermarkMode::Daily, CancelSignal::new()).await
        }
        Command::Backfill(BackfillArgs { series, deadline_secs }) => {
            let cancel = match deadline_secs {
                Some(secs) => CancelSignal::with_deadline(Duration::from_secs(secs)),
                None => CancelSignal::new(),
            };
            extract(&ctx, &series.kinds(), WatermarkMode::Backfill, cancel).await
        }
        Command::Train(TrainArgs { mode }) => train(&ctx, mode.unwrap_or(ctx.config.training_mode)).await,
        Command::Evaluate(args) => evaluate(&ctx, args).await,
        Command::Stats => stats(&ctx).await,
        Command::Schedule => schedule(ctx).await,
        Command::Serve => Ok(()),
    }
}

async fn build_context(config: PipelineConfig, memory: bool) -> anyhow::Result<PipelineContext> {
    let store: Arc<dyn SeriesStore> = if memory {
        warn!("Using in-memory store; nothing will be persisted");
        Arc::new(MemorySeriesStore::new())
    } else {
        let url = config
            .database_url
            .clone()
            .ok_or_else(|| AppError::Config("DATABASE_URL is not set (or pass --memory)".into()))?;
        Arc::new(PgSeriesStore::connect(&url).await?)
    };

    let price_fetcher = EnergyChartsClient::new(config.energy_charts_url.clone())
        .context("failed to build energy-charts client")?;
    let weather_fetcher = OpenMeteoClient::new(
        config.meteo_api_url.clone(),
        config.meteo_latitude,
        config.meteo_longitude,
    )
    .context("failed to build Open-Meteo client")?;

    info!(
        "📊 Pipeline for {} ({}) with weather at {}",
        config.bidding_zone,
        config.country,
        config.weather_key()
    );
    Ok(PipelineContext::new(
        config,
        store,
        Arc::new(price_fetcher),
        Arc::new(weather_fetcher),
    ))
}

async fn extract(
    ctx: &PipelineContext,
    kinds: &[SourceKind],
    mode: WatermarkMode,
    cancel: CancelSignal,
) -> anyhow::Result<()> {
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing the current window");
            on_ctrl_c.cancel();
        }
    });

    let mut nothing_fetched = Vec::new();
    for &kind in kinds {
        let Some(report) = extraction_job::run_extraction(ctx, kind, mode, &cancel).await? else {
            continue;
        };
        if report.windows_attempted > 0 && report.windows_succeeded == 0 {
            nothing_fetched.push(ctx.series_key(kind).to_string());
        }
        if report.cancelled {
            break;
        }
    }

    if !nothing_fetched.is_empty() {
        return Err(AppError::FetchFailure {
            series: nothing_fetched.join(", "),
            attempts: ctx.config.price_extraction.max_attempts,
            message: "no window could be fetched".into(),
        }
        .into());
    }
    Ok(())
}

async fn train(ctx: &PipelineContext, mode: TrainingMode) -> anyhow::Result<()> {
    match training_job::run_training(ctx, mode).await? {
        Some(TrainingOutcome::Trained { samples, batches, path, .. }) => {
            info!("Model trained on {} samples ({} batches), saved to {}", samples, batches, path.display());
        }
        Some(TrainingOutcome::EmptyDataset) => {
            warn!("No joined price/weather rows; no model written");
        }
        None => {}
    }
    Ok(())
}

async fn evaluate(ctx: &PipelineContext, args: EvaluateArgs) -> anyhow::Result<()> {
    let artifact = ctx.artifacts.load()?;
    let sample = args.sample.unwrap_or(ctx.config.evaluation_sample_size);
    let report = ctx.evaluator().evaluate(&artifact, sample).await?;

    println!("Rows evaluated: {}", report.rows.len());
    println!("MAE: {:.4} EUR/MWh", report.mae);
    if let Some(path) = args.csv {
        report.write_csv(&path)?;
    }
    Ok(())
}

async fn stats(ctx: &PipelineContext) -> anyhow::Result<()> {
    let keys = [ctx.series_key(SourceKind::Price), ctx.series_key(SourceKind::Weather)];
    for s in stats_service::collect(ctx.store.as_ref(), &keys).await? {
        let latest = s.latest.map(|ts| ts.to_rfc3339()).unwrap_or_else(|| "-".into());
        println!("{:<32} rows: {:>10}  latest: {}", s.series, s.rows, latest);
    }
    Ok(())
}

async fn schedule(ctx: PipelineContext) -> anyhow::Result<()> {
    let mut scheduler = JobSchedulerService::new(ctx).await?;
    scheduler.start().await?;

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    scheduler.stop().await?;
    Ok(())
}

async fn serve(config: &PipelineConfig) -> anyhow::Result<()> {
    let artifacts = ArtifactStore::new(config.model_path.clone());
    let artifact = artifacts.load()?;
    info!(
        "Model loaded from {} ({} mode, trained {})",
        config.model_path.display(),
        artifact.mode,
        artifact.trained_at
    );

    let app = app::create_app(AppState {
        artifact: Arc::new(artifact),
    });

    let addr: SocketAddr = config
        .server_addr
        .parse()
        .map_err(|e| AppError::Config(format!("SERVER_ADDR '{}': {}", config.server_addr, e)))?;
    let listener = TcpListener::bind(addr).await.context("failed to bind listener")?;
    info!("🚀 Serving predictions on http://{}", addr);
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
