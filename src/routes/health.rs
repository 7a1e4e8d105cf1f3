use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::info;

use crate::state::AppState;

/// `/healthcheck/` is the path the previous deployment served.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/healthcheck/", get(health))
}

async fn health() -> Json<Value> {
    info!("GET health check");
    Json(json!({
        "status": "ok",
        "message": "Energy price prediction API is running"
    }))
}
