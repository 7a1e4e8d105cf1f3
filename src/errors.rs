use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Db(sqlx::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Fetch failed for {series} after {attempts} attempt(s): {message}")]
    FetchFailure {
        series: String,
        attempts: u32,
        message: String,
    },
    #[error("Malformed batch: {0}")]
    MalformedBatch(String),
    #[error("No usable rows in dataset")]
    EmptyDataset,
    #[error("Model artifact not found at {0}")]
    ArtifactMissing(String),
    #[error("Model artifact at {path} is corrupt: {reason}")]
    ArtifactCorrupt { path: String, reason: String },
    #[error("Scaler expects {expected} features, got {actual}")]
    ScalerDimensionMismatch { expected: usize, actual: usize },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Scheduler error: {0}")]
    Scheduler(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Process exit code for one-shot command runs.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) | AppError::Validation(_) => 2,
            AppError::Db(_) | AppError::Io(_) => 3,
            AppError::FetchFailure { .. } | AppError::MalformedBatch(_) => 4,
            AppError::ArtifactMissing(_) | AppError::ArtifactCorrupt { .. } => 5,
            AppError::ScalerDimensionMismatch { .. } => 6,
            AppError::EmptyDataset => 7,
            AppError::Scheduler(_) => 8,
            AppError::Internal(_) => 1,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Validation(_) | AppError::ScalerDimensionMismatch { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::ArtifactMissing(_) | AppError::ArtifactCorrupt { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::FetchFailure { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let detail = match &self {
            AppError::Db(_) | AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(value: sqlx::Error) -> Self {
        AppError::Db(value)
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(value: sqlx::migrate::MigrateError) -> Self {
        AppError::Db(sqlx::Error::Migrate(Box::new(value)))
    }
}
