//! Tracing setup shared by the one-shot commands, the scheduler and the
//! prediction server.
//!
//! Every pipeline run is wrapped in a [`job_span`] carrying `job` and (for
//! extraction) `series` fields, so interleaved scheduler output can be told
//! apart. With `LOG_SPAN_TIMING` on, the fmt layer also prints each run's
//! busy/idle time when its span closes.

use tracing::Span;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::models::SeriesKey;

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub loki_enabled: bool,
    pub loki_url: Option<String>,
    pub service_name: String,
    pub environment: String,
    pub log_level: String,
    pub span_timing: bool,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self {
            loki_enabled: env_flag("LOKI_ENABLED", false),
            loki_url: std::env::var("LOKI_URL").ok(),
            service_name: std::env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "energy-pipeline".to_string()),
            environment: std::env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            log_level: std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,sqlx=warn,tokio_cron_scheduler=warn".to_string()),
            span_timing: env_flag("LOG_SPAN_TIMING", true),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.loki_enabled && self.loki_url.is_none() {
            return Err("LOKI_ENABLED is true but LOKI_URL is not set".to_string());
        }
        self.filter()?;
        Ok(())
    }

    fn filter(&self) -> Result<EnvFilter, String> {
        EnvFilter::try_new(&self.log_level)
            .map_err(|e| format!("invalid log filter '{}': {}", self.log_level, e))
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Span for one run of a pipeline job.
pub fn job_span(job: &'static str, series: Option<&SeriesKey>) -> Span {
    match series {
        Some(key) => tracing::info_span!("job", job, series = %key),
        None => tracing::info_span!("job", job),
    }
}

fn fmt_layer<S>(config: &LoggingConfig) -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let span_events = if config.span_timing { FmtSpan::CLOSE } else { FmtSpan::NONE };
    tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_span_events(span_events)
}

/// Install the global subscriber. Must run inside a tokio runtime when Loki is enabled.
pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    config.validate()?;

    #[cfg(feature = "loki")]
    {
        if config.loki_enabled {
            if let Some(loki_url) = config.loki_url.clone() {
                return init_with_loki(config, &loki_url);
            }
        }
    }

    tracing_subscriber::registry()
        .with(config.filter()?)
        .with(fmt_layer(&config))
        .try_init()?;
    tracing::debug!("Console logging initialized for {}", config.service_name);
    Ok(())
}

#[cfg(feature = "loki")]
fn init_with_loki(config: LoggingConfig, loki_url: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (loki_layer, task) = tracing_loki::builder()
        .label("service", &config.service_name)?
        .label("environment", &config.environment)?
        .build_url(url::Url::parse(loki_url)?)?;
    tokio::spawn(task);

    tracing_subscriber::registry()
        .with(config.filter()?)
        .with(fmt_layer(&config))
        .with(loki_layer)
        .try_init()?;
    tracing::info!("Shipping logs for {} to Loki at {}", config.service_name, loki_url);
    Ok(())
}
