use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::errors::AppError;
use crate::models::{FEATURE_DIM, PRICE_UNIT};
use crate::state::AppState;

/// `/predict/` is the path the previous deployment served.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/predict", post(predict))
        .route("/predict/", post(predict))
}

/// Raw feature values, one field per entry of the feature contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub temperature: f64,
    pub humidity: f64,
    pub precipitation: f64,
    pub rain: f64,
    pub snowfall: f64,
    pub surface_pressure: f64,
    pub cloud_cover: f64,
    pub wind_speed_10m: f64,
    pub wind_speed_100m: f64,
    pub wind_direction_10m: f64,
    pub wind_direction_100m: f64,
    /// Whole days since the model's feature epoch. Batch-relative day
    /// offsets are not interchangeable with this and are not accepted.
    pub days_since_epoch: i64,
}

impl PredictRequest {
    fn feature_row(&self) -> [f64; FEATURE_DIM] {
        [
            self.temperature,
            self.humidity,
            self.precipitation,
            self.rain,
            self.snowfall,
            self.surface_pressure,
            self.cloud_cover,
            self.wind_speed_10m,
            self.wind_speed_100m,
            self.wind_direction_10m,
            self.wind_direction_100m,
            self.days_since_epoch as f64,
        ]
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub predicted_price: f64,
    pub unit: String,
    pub input_data: PredictRequest,
}

pub async fn predict(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, AppError> {
    info!("POST /predict - days_since_epoch={}", request.days_since_epoch);

    let row = request.feature_row();
    if row.iter().any(|v| !v.is_finite()) {
        return Err(AppError::Validation("all feature values must be finite".into()));
    }

    let price = state.artifact.predict(&row).map_err(|e| {
        error!("Prediction failed: {}", e);
        e
    })?;

    Ok(Json(PredictResponse {
        predicted_price: (price * 100.0).round() / 100.0,
        unit: PRICE_UNIT.to_string(),
        input_data: request,
    }))
}
